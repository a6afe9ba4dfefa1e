//! The destination time axis.
//!
//! A [`TimeAxis`] is the fixed-length, strictly ascending sequence of
//! timestamps every variable in a store is aligned against. It is created
//! once when a store is initialized and never mutated afterwards; growing it
//! is not supported.

use std::ops::Index;

use crate::error::{AxisError, Result};
use crate::timestamp::Timestamp;

/// An ordered, immutable sequence of distinct timestamps.
///
/// Strict ascent is checked on construction, so positions are unique and
/// [`position_of`](Self::position_of) can binary search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeAxis {
    timestamps: Vec<Timestamp>,
}

impl TimeAxis {
    /// Builds an axis from timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`AxisError::Empty`] for an empty sequence and
    /// [`AxisError::NotAscending`] at the first position that does not
    /// strictly follow its predecessor.
    pub fn new(timestamps: Vec<Timestamp>) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(AxisError::Empty.into());
        }

        if let Some(index) = first_non_ascending(&timestamps) {
            return Err(AxisError::NotAscending { index }.into());
        }

        Ok(Self { timestamps })
    }

    /// Builds an evenly spaced axis of `length` steps starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`AxisError::Empty`] for a zero length,
    /// [`AxisError::NotAscending`] for a non-positive step, and
    /// [`TimestampError::Overflow`](crate::error::TimestampError::Overflow) if the axis runs out of date range.
    pub fn regular(start: &Timestamp, step_seconds: i64, length: usize) -> Result<Self> {
        if length == 0 {
            return Err(AxisError::Empty.into());
        }
        if step_seconds <= 0 {
            return Err(AxisError::NotAscending { index: 1 }.into());
        }

        let mut timestamps = Vec::with_capacity(length);
        let mut current = start.clone();
        for _ in 1..length {
            let next = current.checked_add_seconds(step_seconds)?;
            timestamps.push(std::mem::replace(&mut current, next));
        }
        timestamps.push(current);

        Ok(Self { timestamps })
    }

    /// Number of positions on the axis.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false`; an axis has at least one timestamp.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamp at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<&Timestamp> {
        self.timestamps.get(index)
    }

    /// First timestamp on the axis.
    pub fn first(&self) -> &Timestamp {
        &self.timestamps[0]
    }

    /// Last timestamp on the axis.
    pub fn last(&self) -> &Timestamp {
        &self.timestamps[self.timestamps.len() - 1]
    }

    /// All timestamps in order.
    pub fn as_slice(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Position of `timestamp` on the axis, if present.
    pub fn position_of(&self, timestamp: &Timestamp) -> Option<usize> {
        self.timestamps.binary_search(timestamp).ok()
    }
}

impl Index<usize> for TimeAxis {
    type Output = Timestamp;

    fn index(&self, index: usize) -> &Self::Output {
        &self.timestamps[index]
    }
}

/// Index of the first timestamp that is not strictly greater than the one before.
pub(crate) fn first_non_ascending(timestamps: &[Timestamp]) -> Option<usize> {
    timestamps
        .windows(2)
        .position(|pair| pair[0] >= pair[1])
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HydroError;

    fn ts(text: &str) -> Timestamp {
        Timestamp::parse(text).unwrap()
    }

    #[test]
    fn test_new_accepts_ascending() {
        let axis = TimeAxis::new(vec![
            ts("2000-01-01 00:00:00 UTC"),
            ts("2000-01-02 00:00:00 UTC"),
            ts("2000-01-04 00:00:00 UTC"),
        ])
        .unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.position_of(&ts("2000-01-04 00:00:00 UTC")), Some(2));
        assert_eq!(axis.position_of(&ts("2000-01-03 00:00:00 UTC")), None);
    }

    #[test]
    fn test_new_rejects_duplicates_and_empty() {
        let result = TimeAxis::new(vec![
            ts("2000-01-01 00:00:00 UTC"),
            ts("2000-01-02 00:00:00 UTC"),
            ts("2000-01-02 00:00:00 UTC"),
        ]);
        assert!(matches!(
            result,
            Err(HydroError::Axis(AxisError::NotAscending { index: 2 }))
        ));
        assert!(matches!(
            TimeAxis::new(Vec::new()),
            Err(HydroError::Axis(AxisError::Empty))
        ));
    }

    #[test]
    fn test_regular_daily_axis() {
        let axis = TimeAxis::regular(&ts("2000-02-27 00:00:00 UTC"), 86_400, 4).unwrap();
        let rendered: Vec<String> = axis.as_slice().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "2000-02-27 00:00:00 UTC",
                "2000-02-28 00:00:00 UTC",
                "2000-02-29 00:00:00 UTC",
                "2000-03-01 00:00:00 UTC",
            ]
        );
        assert_eq!(axis.first(), &axis[0]);
        assert_eq!(axis.last().to_string(), "2000-03-01 00:00:00 UTC");
    }

    #[test]
    fn test_regular_rejects_bad_parameters() {
        let start = ts("2000-01-01 00:00:00 UTC");
        assert!(TimeAxis::regular(&start, 3600, 0).is_err());
        assert!(TimeAxis::regular(&start, 0, 5).is_err());
        assert!(TimeAxis::regular(&start, -60, 5).is_err());
    }
}
