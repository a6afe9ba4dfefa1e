//! Source series read from a source store.
//!
//! A [`SourceSeries`] is one named, time-ordered value sequence together with
//! its string metadata. It is owned by a single align-and-write operation and
//! dropped afterwards.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::axis::first_non_ascending;
use crate::error::{Result, SeriesError};
use crate::timestamp::Timestamp;

/// Metadata attached to a series and copied to its destination variable.
pub type Metadata = BTreeMap<String, String>;

/// A named series of timestamped values.
///
/// Missing samples are `None`. Timestamps are strictly ascending and
/// parallel to the values.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSeries {
    name: String,
    timestamps: Vec<Timestamp>,
    values: Vec<Option<f64>>,
    metadata: Metadata,
}

impl SourceSeries {
    /// Creates a series, validating its shape.
    ///
    /// Non-finite values are stored as missing.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::LengthMismatch`] if timestamps and values differ
    /// in length, and [`SeriesError::NotAscending`] if timestamps repeat or go
    /// backwards.
    pub fn new(
        name: impl Into<String>,
        timestamps: Vec<Timestamp>,
        values: Vec<Option<f64>>,
        metadata: Metadata,
    ) -> Result<Self> {
        let name = name.into();

        if timestamps.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                name,
                timestamps: timestamps.len(),
                values: values.len(),
            }
            .into());
        }

        if let Some(index) = first_non_ascending(&timestamps) {
            return Err(SeriesError::NotAscending { name, index }.into());
        }

        let values = values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();

        Ok(Self {
            name,
            timestamps,
            values,
            metadata,
        })
    }

    /// Destination variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timestamps, strictly ascending.
    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Values, parallel to [`timestamps`](Self::timestamps).
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Metadata entries.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the series has no samples.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Converts a loosely typed JSON object into string metadata.
///
/// Strings are kept verbatim, numbers and booleans use their JSON text,
/// `null` entries are dropped, and arrays or objects are kept as compact JSON.
pub fn coerce_metadata(raw: Map<String, Value>) -> Metadata {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((key, text))
        })
        .collect()
}
