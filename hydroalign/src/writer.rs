//! Executes an alignment decision against an array store.
//!
//! [`write_aligned`] turns a decision into store mutations in a fixed order:
//! declare the variable over the full dimension, write the values at the
//! decided offset, attach the series metadata as attributes, then commit.
//! A variable is reported as written only once the commit has succeeded.

use serde::Serialize;
use tracing::{info, warn};

use crate::align::AlignmentDecision;
use crate::error::{HydroError, Result, SkipReason, StoreError};
use crate::series::SourceSeries;
use crate::store::{ArrayStore, MAX_VARIABLE_NAME_LEN};

/// What happened to one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// All values and attributes were committed.
    Written {
        /// Destination variable name.
        variable: String,
        /// Axis position of the first value.
        start_index: usize,
        /// Number of positions populated.
        count: usize,
    },
    /// Nothing was written for this variable.
    ///
    /// When the series could not be read at all, `variable` is only the name
    /// derived from its source id, and `source` carries that id.
    Skipped {
        /// Destination variable name.
        variable: String,
        /// Why.
        reason: SkipReason,
        /// Human-readable detail.
        detail: String,
        /// Source id, set when the series never reached the aligner.
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl WriteOutcome {
    /// Builds a skip outcome.
    pub fn skipped(variable: impl Into<String>, reason: SkipReason, detail: impl Into<String>) -> Self {
        Self::Skipped {
            variable: variable.into(),
            reason,
            detail: detail.into(),
            source: None,
        }
    }

    /// Attaches the source id to a skip outcome.
    #[must_use]
    pub fn with_source(mut self, id: impl Into<String>) -> Self {
        if let Self::Skipped { source, .. } = &mut self {
            *source = Some(id.into());
        }
        self
    }

    /// Source id of a series that could not be read.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Written { .. } => None,
            Self::Skipped { source, .. } => source.as_deref(),
        }
    }

    /// Destination variable name.
    pub fn variable(&self) -> &str {
        match self {
            Self::Written { variable, .. } | Self::Skipped { variable, .. } => variable,
        }
    }

    /// Whether the variable was written.
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    /// Skip reason, if skipped.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Written { .. } => None,
            Self::Skipped { reason, .. } => Some(*reason),
        }
    }
}

/// Writes `series` into `store` as `decision` dictates.
///
/// `axis_len` is the length of the axis the decision was made against and
/// must equal the store's dimension length. Missing samples are written as
/// the store's fill value.
///
/// # Errors
///
/// Alignment failures, name collisions and unusable names are returned as
/// [`WriteOutcome::Skipped`], not as errors. An `Err` means the store itself
/// failed (I/O, metadata, or [`StoreError::DimensionMismatch`]) and the run
/// should stop.
pub fn write_aligned(
    store: &mut ArrayStore,
    axis_len: usize,
    decision: &AlignmentDecision,
    series: &SourceSeries,
) -> Result<WriteOutcome> {
    let name = series.name();

    if axis_len != store.axis_len() {
        return Err(StoreError::DimensionMismatch {
            expected: axis_len,
            actual: store.axis_len(),
        }
        .into());
    }

    let start_index = match *decision {
        AlignmentDecision::ExactMatch => 0,
        AlignmentDecision::OffsetMatch { start_index } => start_index,
        AlignmentDecision::NoMatch { reason } => {
            let detail = no_match_detail(reason, series, axis_len);
            warn!(variable = name, %reason, "skipping series: {detail}");
            return Ok(WriteOutcome::skipped(name, reason, detail));
        }
    };

    let fill = store.fill_value();
    let mut pending = match store.declare_variable(name, fill) {
        Ok(pending) => pending,
        Err(HydroError::Store(StoreError::VariableExists { .. })) => {
            let reason = SkipReason::VariableNameCollision;
            warn!(variable = name, %reason, "skipping series: variable already exists");
            return Ok(WriteOutcome::skipped(
                name,
                reason,
                "destination already has a variable with this name",
            ));
        }
        Err(HydroError::Store(StoreError::InvalidVariableName { .. })) => {
            let reason = SkipReason::InvalidVariableName;
            warn!(variable = name, %reason, "skipping series: unusable variable name");
            return Ok(WriteOutcome::skipped(
                name,
                reason,
                format!(
                    "name must be 1 to {MAX_VARIABLE_NAME_LEN} characters of [A-Za-z0-9_.-] and not start with '.'"
                ),
            ));
        }
        Err(e) => return Err(e),
    };

    let values: Vec<f64> = series
        .values()
        .iter()
        .map(|v| v.unwrap_or(fill))
        .collect();
    pending.write_at(start_index, &values)?;

    for (key, value) in series.metadata() {
        pending.set_attribute(key.as_str(), value.as_str());
    }

    pending.commit()?;

    info!(variable = name, start_index, count = values.len(), "wrote series");

    Ok(WriteOutcome::Written {
        variable: name.to_string(),
        start_index,
        count: values.len(),
    })
}

fn no_match_detail(reason: SkipReason, series: &SourceSeries, axis_len: usize) -> String {
    let first = series
        .timestamps()
        .first()
        .map_or_else(|| "<empty>".to_string(), ToString::to_string);

    match reason {
        SkipReason::NoTemporalOverlap => {
            format!("first timestamp {first} is not on the axis")
        }
        SkipReason::AxisOverrun => format!(
            "{} values starting at {first} run past the end of a {axis_len}-step axis",
            series.len()
        ),
        SkipReason::ElementwiseMismatch => {
            format!("timestamps starting at {first} do not match the axis element by element")
        }
        SkipReason::VariableNameCollision
        | SkipReason::InvalidVariableName
        | SkipReason::SourceRead => reason.code().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::decide;
    use crate::axis::TimeAxis;
    use crate::series::Metadata;
    use crate::timestamp::Timestamp;
    use tempfile::{TempDir, tempdir};

    fn day(d: u32) -> Timestamp {
        Timestamp::parse(&format!("2000-01-{d:02} 00:00:00 UTC")).unwrap()
    }

    fn setup(days: u32) -> (TempDir, ArrayStore, TimeAxis) {
        let temp_dir = tempdir().unwrap();
        let axis = TimeAxis::new((1..=days).map(day).collect()).unwrap();
        let store = ArrayStore::create(temp_dir.path().join("store"), &axis, None).unwrap();
        (temp_dir, store, axis)
    }

    fn series(name: &str, days: &[u32], values: &[Option<f64>]) -> SourceSeries {
        let mut metadata = Metadata::new();
        metadata.insert("units".to_string(), "cfs".to_string());
        metadata.insert("location".to_string(), "GAUGE1".to_string());
        SourceSeries::new(
            name,
            days.iter().copied().map(day).collect(),
            values.to_vec(),
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn test_exact_match_writes_prefix() {
        let (_dir, mut store, axis) = setup(3);
        let s = series("flow", &[1, 2, 3], &[Some(1.0), Some(2.0), Some(3.0)]);

        let outcome = write_aligned(&mut store, axis.len(), &decide(&axis, &s), &s).unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Written {
                variable: "flow".to_string(),
                start_index: 0,
                count: 3
            }
        );
        assert_eq!(store.read_variable("flow").unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(store.variable("flow").unwrap().attributes["units"], "cfs");
    }

    #[test]
    fn test_offset_match_leaves_head_missing() {
        let (_dir, mut store, axis) = setup(5);
        let s = series("stage", &[3, 4, 5], &[Some(10.0), Some(20.0), Some(30.0)]);

        let decision = decide(&axis, &s);
        assert_eq!(decision, AlignmentDecision::OffsetMatch { start_index: 2 });

        write_aligned(&mut store, axis.len(), &decision, &s).unwrap();
        let written = store.read_variable("stage").unwrap();
        assert!(written[0].is_nan());
        assert!(written[1].is_nan());
        assert_eq!(&written[2..], &[10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_missing_values_use_fill() {
        let temp_dir = tempdir().unwrap();
        let axis = TimeAxis::new((1..=3).map(day).collect()).unwrap();
        let mut store =
            ArrayStore::create(temp_dir.path().join("store"), &axis, Some(-901.0)).unwrap();
        let s = series("precip", &[1, 2], &[None, Some(0.5)]);

        write_aligned(&mut store, 3, &decide(&axis, &s), &s).unwrap();
        assert_eq!(
            store.read_variable("precip").unwrap(),
            vec![-901.0, 0.5, -901.0]
        );
    }

    #[test]
    fn test_no_match_does_not_touch_store() {
        let (_dir, mut store, axis) = setup(3);
        let s = series("flow", &[2, 3, 4], &[Some(5.0), Some(6.0), Some(7.0)]);

        let outcome = write_aligned(&mut store, axis.len(), &decide(&axis, &s), &s).unwrap();
        assert_eq!(outcome.skip_reason(), Some(SkipReason::AxisOverrun));
        assert!(store.variables().is_empty());
        assert!(!store.path().join("vars/flow.slab").exists());
    }

    #[test]
    fn test_collision_is_a_skip() {
        let (_dir, mut store, axis) = setup(3);
        let s = series("flow", &[1], &[Some(1.0)]);

        write_aligned(&mut store, axis.len(), &decide(&axis, &s), &s).unwrap();
        let again = write_aligned(&mut store, axis.len(), &decide(&axis, &s), &s).unwrap();
        assert_eq!(again.skip_reason(), Some(SkipReason::VariableNameCollision));
        assert_eq!(store.variables().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let (_dir, mut store, axis) = setup(3);
        let s = series("flow", &[1], &[Some(1.0)]);

        let result = write_aligned(&mut store, 4, &decide(&axis, &s), &s);
        assert!(matches!(
            result,
            Err(HydroError::Store(StoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            }))
        ));
    }

    #[test]
    fn test_outcome_serializes_with_reason_code() {
        let outcome = WriteOutcome::skipped("flow", SkipReason::NoTemporalOverlap, "x");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "no_overlap");
        assert!(json.get("source").is_none());
        assert_eq!(outcome.variable(), "flow");

        let unreadable =
            WriteOutcome::skipped("a.json", SkipReason::SourceRead, "x").with_source("a.json");
        assert_eq!(unreadable.source(), Some("a.json"));
        assert_eq!(serde_json::to_value(&unreadable).unwrap()["source"], "a.json");
    }

    #[test]
    fn test_invalid_name_is_a_skip() {
        let (_dir, mut store, axis) = setup(3);

        let too_long = "a".repeat(MAX_VARIABLE_NAME_LEN + 3);
        for name in ["river stage", too_long.as_str()] {
            let s = series(name, &[1], &[Some(1.0)]);
            let outcome = write_aligned(&mut store, axis.len(), &decide(&axis, &s), &s).unwrap();
            assert_eq!(outcome.skip_reason(), Some(SkipReason::InvalidVariableName));
        }
        assert!(store.variables().is_empty());
    }
}
