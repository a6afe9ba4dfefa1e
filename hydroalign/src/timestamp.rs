//! Canonical timestamps.
//!
//! Every timestamp crossing a store boundary is rendered as
//! `YYYY-MM-DD HH:MM:SS <TZ>`, e.g. `2000-01-01 00:00:00 UTC`. The persisted
//! time variable is a fixed-width character column of [`TIMESTAMP_STRLEN`]
//! bytes, so the zone label is capped at [`MAX_ZONE_LEN`] characters.
//!
//! Equality is literal: two timestamps are equal only if both the wall-clock
//! instant and the zone label match. No zone conversion is ever applied.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TimestampError;

/// `strftime` pattern of the date-time part.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of the rendered date-time part.
const DATETIME_LEN: usize = 19;

/// Maximum length of a zone label.
pub const MAX_ZONE_LEN: usize = 8;

/// Declared maximum string length of a canonical timestamp.
pub const TIMESTAMP_STRLEN: usize = DATETIME_LEN + 1 + MAX_ZONE_LEN;

/// A wall-clock instant tagged with a zone label.
///
/// Ordering compares the instant first, then the label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    at: NaiveDateTime,
    zone: String,
}

impl Timestamp {
    /// Creates a timestamp from an instant and a zone label.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::InvalidZone`] if the label is empty, longer
    /// than [`MAX_ZONE_LEN`], or contains anything but ASCII alphanumerics,
    /// `+` or `-`.
    pub fn new(at: NaiveDateTime, zone: &str) -> Result<Self, TimestampError> {
        validate_zone(zone)?;
        Ok(Self {
            at,
            zone: zone.to_string(),
        })
    }

    /// Parses the canonical `YYYY-MM-DD HH:MM:SS <TZ>` form.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Malformed`] for anything that does not
    /// render back to exactly the same date-time text, and
    /// [`TimestampError::InvalidZone`] for a bad label.
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let malformed = |reason: &str| TimestampError::Malformed {
            text: text.to_string(),
            reason: reason.to_string(),
        };

        let (datetime, zone) = text
            .split_once(' ')
            .and_then(|(date, rest)| {
                let (time, zone) = rest.split_once(' ')?;
                Some((text.get(..date.len() + 1 + time.len())?, zone))
            })
            .ok_or_else(|| malformed("expected '<date> <time> <zone>'"))?;

        if datetime.len() != DATETIME_LEN {
            return Err(malformed("date-time part must be 'YYYY-MM-DD HH:MM:SS'"));
        }

        let at = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT)
            .map_err(|e| malformed(&e.to_string()))?;

        // chrono accepts unpadded fields; insist on the canonical rendering.
        if at.format(DATETIME_FORMAT).to_string() != datetime {
            return Err(malformed("date-time part is not zero-padded"));
        }

        Self::new(at, zone)
    }

    /// The wall-clock instant.
    pub fn at(&self) -> NaiveDateTime {
        self.at
    }

    /// The zone label.
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Returns this timestamp shifted by `seconds`, keeping the zone label.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Overflow`] if the result is out of range.
    pub fn checked_add_seconds(&self, seconds: i64) -> Result<Self, TimestampError> {
        TimeDelta::try_seconds(seconds)
            .and_then(|delta| self.at.checked_add_signed(delta))
            .map(|at| Self {
                at,
                zone: self.zone.clone(),
            })
            .ok_or_else(|| TimestampError::Overflow {
                base: self.to_string(),
                seconds,
            })
    }
}

fn validate_zone(zone: &str) -> Result<(), TimestampError> {
    let valid = !zone.is_empty()
        && zone.len() <= MAX_ZONE_LEN
        && zone
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(TimestampError::InvalidZone {
            label: zone.to_string(),
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.at.format(DATETIME_FORMAT), self.zone)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
