//! Source stores that hand series to the batch driver.
//!
//! The legacy binary container itself is read elsewhere; this module defines
//! the [`SourceStore`] seam plus two implementations:
//!
//! - [`JsonSource`] reads a directory of exported series, one JSON file each.
//! - [`MemorySource`] holds series in memory, with optional injected read
//!   failures.
//!
//! # Export format
//!
//! ```json
//! {
//!   "path": "/BASIN/GAUGE1/FLOW//1DAY/OBS/",
//!   "timestamps": ["2000-01-01 00:00:00 UTC", "2000-01-02 00:00:00 UTC"],
//!   "values": [12.5, null],
//!   "metadata": { "units": "cfs", "type": "INST-VAL" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HydroError, SourceError};
use crate::series::{Metadata, SourceSeries, coerce_metadata};
use crate::store::MAX_VARIABLE_NAME_LEN;
use crate::timestamp::Timestamp;

/// Attribute recording where a series came from.
pub const SOURCE_PATH_ATTRIBUTE: &str = "source_path";

/// Identifies one series inside a source store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId {
    path: String,
}

impl VariableId {
    /// Creates an id from a source path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// The source path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name to use for the destination variable.
    ///
    /// A six-part pathname `/A/B/C/D/E/F/` becomes its non-empty B and C
    /// parts joined by `_`; any other path is used whole. Characters outside
    /// `[A-Za-z0-9_.-]` are replaced by `_`, and the result is cut to
    /// [`MAX_VARIABLE_NAME_LEN`] bytes.
    pub fn destination_name(&self) -> String {
        let parts: Vec<&str> = self.path.split('/').collect();
        let is_pathname = parts.len() == 8
            && parts[0].is_empty()
            && parts[7].is_empty();

        let raw = if is_pathname {
            let picked: Vec<&str> = parts[2..4]
                .iter()
                .copied()
                .filter(|p| !p.is_empty())
                .collect();
            if picked.is_empty() {
                self.path.clone()
            } else {
                picked.join("_")
            }
        } else {
            self.path.clone()
        };

        let sanitized: String = raw
            .trim_matches('/')
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // Leading dots would make a hidden slab file.
        let sanitized = sanitized.trim_start_matches('.');
        if sanitized.is_empty() {
            return "unnamed".to_string();
        }

        // All ASCII by now, so any byte offset is a char boundary.
        sanitized[..sanitized.len().min(MAX_VARIABLE_NAME_LEN)].to_string()
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Something that can enumerate and materialize series.
pub trait SourceStore {
    /// Lists every series, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the source cannot be enumerated; this is
    /// fatal for a batch run.
    fn list_variables(&self) -> Result<Vec<VariableId>, SourceError>;

    /// Reads one series.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the series cannot be read; the batch driver
    /// skips that variable and moves on.
    fn read_series(&self, id: &VariableId) -> Result<SourceSeries, SourceError>;
}

/// In-memory source.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: BTreeMap<VariableId, std::result::Result<SourceSeries, String>>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a series under `id`.
    pub fn insert(&mut self, id: VariableId, series: SourceSeries) -> &mut Self {
        self.entries.insert(id, Ok(series));
        self
    }

    /// Registers `id` as present but unreadable.
    pub fn insert_unreadable(&mut self, id: VariableId, reason: impl Into<String>) -> &mut Self {
        self.entries.insert(id, Err(reason.into()));
        self
    }
}

impl SourceStore for MemorySource {
    fn list_variables(&self) -> Result<Vec<VariableId>, SourceError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn read_series(&self, id: &VariableId) -> Result<SourceSeries, SourceError> {
        match self.entries.get(id) {
            Some(Ok(series)) => Ok(series.clone()),
            Some(Err(reason)) => Err(SourceError::Read {
                path: id.path().to_string(),
                reason: reason.clone(),
            }),
            None => Err(SourceError::Read {
                path: id.path().to_string(),
                reason: "no such series".to_string(),
            }),
        }
    }
}

/// One exported series file.
#[derive(Debug, Deserialize)]
struct SeriesRecord {
    path: String,
    timestamps: Vec<String>,
    values: Vec<Option<f64>>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Directory of exported series files.
///
/// Variable ids are the file names (`*.json`), listed in sorted order; the
/// `path` field inside each file names the series.
#[derive(Debug, Clone)]
pub struct JsonSource {
    dir: PathBuf,
}

impl JsonSource {
    /// Creates a source over `dir`. Nothing is read until listing.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The directory being read.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse(&self, id: &VariableId, json: &str) -> Result<SourceSeries, SourceError> {
        let record: SeriesRecord = serde_json::from_str(json).map_err(|e| SourceError::Parse {
            file: id.path().to_string(),
            source: e,
        })?;

        let invalid = |reason: String| SourceError::Invalid {
            path: record.path.clone(),
            reason,
        };

        let timestamps = record
            .timestamps
            .iter()
            .map(|text| Timestamp::parse(text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;

        let mut metadata: Metadata = coerce_metadata(record.metadata.clone());
        if let Some(exported) = metadata.get(SOURCE_PATH_ATTRIBUTE) {
            debug!(
                file = id.path(),
                exported = exported.as_str(),
                "keeping exported {SOURCE_PATH_ATTRIBUTE} attribute"
            );
        } else {
            metadata.insert(SOURCE_PATH_ATTRIBUTE.to_string(), record.path.clone());
        }

        let name = VariableId::new(record.path.as_str()).destination_name();

        SourceSeries::new(name, timestamps, record.values.clone(), metadata).map_err(|e| match e {
            HydroError::Series(inner) => invalid(inner.to_string()),
            other => invalid(other.to_string()),
        })
    }
}

impl SourceStore for JsonSource {
    fn list_variables(&self) -> Result<Vec<VariableId>, SourceError> {
        let listing_failed = |source: std::io::Error| SourceError::Listing {
            location: self.dir.display().to_string(),
            source,
        };

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(listing_failed)? {
            let path = entry.map_err(listing_failed)?.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            if !is_json || !path.is_file() {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                ids.push(VariableId::new(file_name));
            }
        }
        ids.sort();

        debug!(dir = %self.dir.display(), count = ids.len(), "listed source series");
        Ok(ids)
    }

    fn read_series(&self, id: &VariableId) -> Result<SourceSeries, SourceError> {
        let file = self.dir.join(id.path());
        let json = fs::read_to_string(&file).map_err(|e| SourceError::Read {
            path: id.path().to_string(),
            reason: e.to_string(),
        })?;

        self.parse(id, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_destination_name_from_pathname() {
        let id = VariableId::new("/BASIN/GAUGE1/FLOW//1DAY/OBS/");
        assert_eq!(id.destination_name(), "GAUGE1_FLOW");

        let id = VariableId::new("/BASIN//PRECIP-INC//1HOUR/OBS/");
        assert_eq!(id.destination_name(), "PRECIP-INC");
    }

    #[test]
    fn test_destination_name_fallback() {
        assert_eq!(VariableId::new("river stage").destination_name(), "river_stage");
        assert_eq!(VariableId::new("a/b").destination_name(), "a_b");
        assert_eq!(VariableId::new("..").destination_name(), "unnamed");
        assert_eq!(VariableId::new("/A/////F/").destination_name(), "A_____F");
    }

    #[test]
    fn test_destination_name_is_capped() {
        let long_b = "G".repeat(250);
        let id = VariableId::new(format!("/A/{long_b}/FLOW//1DAY/OBS/"));
        let name = id.destination_name();
        assert_eq!(name.len(), MAX_VARIABLE_NAME_LEN);
        assert!(name.starts_with(&long_b));

        let id = VariableId::new(format!("...{}", "x".repeat(400)));
        assert_eq!(id.destination_name(), "x".repeat(MAX_VARIABLE_NAME_LEN));
    }

    #[test]
    fn test_memory_source() {
        let series = SourceSeries::new(
            "flow",
            vec![Timestamp::parse("2000-01-01 00:00:00 UTC").unwrap()],
            vec![Some(1.0)],
            Metadata::new(),
        )
        .unwrap();

        let mut source = MemorySource::new();
        source
            .insert(VariableId::new("b"), series.clone())
            .insert_unreadable(VariableId::new("a"), "checksum mismatch");

        let ids = source.list_variables().unwrap();
        assert_eq!(ids, vec![VariableId::new("a"), VariableId::new("b")]);
        assert_eq!(source.read_series(&ids[1]).unwrap(), series);
        let err = source.read_series(&ids[0]).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_json_source_reads_export() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("02_flow.json"),
            r#"{
                "path": "/BASIN/GAUGE1/FLOW//1DAY/OBS/",
                "timestamps": ["2000-01-01 00:00:00 UTC", "2000-01-02 00:00:00 UTC"],
                "values": [12.5, null],
                "metadata": {"units": "cfs", "count": 2}
            }"#,
        )
        .unwrap();
        fs::write(temp_dir.path().join("01_notes.txt"), "ignored").unwrap();
        fs::create_dir(temp_dir.path().join("nested.json")).unwrap();

        let source = JsonSource::new(temp_dir.path());
        let ids = source.list_variables().unwrap();
        assert_eq!(ids, vec![VariableId::new("02_flow.json")]);

        let series = source.read_series(&ids[0]).unwrap();
        assert_eq!(series.name(), "GAUGE1_FLOW");
        assert_eq!(series.values(), &[Some(12.5), None]);
        assert_eq!(series.metadata()["units"], "cfs");
        assert_eq!(series.metadata()["count"], "2");
        assert_eq!(
            series.metadata()[SOURCE_PATH_ATTRIBUTE],
            "/BASIN/GAUGE1/FLOW//1DAY/OBS/"
        );
    }

    #[test]
    fn test_json_source_keeps_exported_source_path() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("flow.json"),
            r#"{
                "path": "/BASIN/GAUGE1/FLOW//1DAY/OBS/",
                "timestamps": ["2000-01-01 00:00:00 UTC"],
                "values": [1.0],
                "metadata": {"source_path": "archive.dss:/BASIN/GAUGE1/FLOW//1DAY/OBS/"}
            }"#,
        )
        .unwrap();

        let series = JsonSource::new(temp_dir.path())
            .read_series(&VariableId::new("flow.json"))
            .unwrap();
        assert_eq!(
            series.metadata()[SOURCE_PATH_ATTRIBUTE],
            "archive.dss:/BASIN/GAUGE1/FLOW//1DAY/OBS/"
        );
    }

    #[test]
    fn test_json_source_errors() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("bad.json"), "{").unwrap();
        fs::write(
            temp_dir.path().join("bad_ts.json"),
            r#"{"path": "x", "timestamps": ["yesterday"], "values": [1.0]}"#,
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("short.json"),
            r#"{"path": "x", "timestamps": ["2000-01-01 00:00:00 UTC"], "values": []}"#,
        )
        .unwrap();

        let source = JsonSource::new(temp_dir.path());
        assert!(matches!(
            source.read_series(&VariableId::new("bad.json")),
            Err(SourceError::Parse { .. })
        ));
        assert!(matches!(
            source.read_series(&VariableId::new("bad_ts.json")),
            Err(SourceError::Invalid { .. })
        ));
        assert!(matches!(
            source.read_series(&VariableId::new("short.json")),
            Err(SourceError::Invalid { .. })
        ));
        assert!(matches!(
            source.read_series(&VariableId::new("missing.json")),
            Err(SourceError::Read { .. })
        ));
    }

    #[test]
    fn test_json_source_missing_dir() {
        let temp_dir = tempdir().unwrap();
        let source = JsonSource::new(temp_dir.path().join("nope"));
        assert!(matches!(
            source.list_variables(),
            Err(SourceError::Listing { .. })
        ));
    }
}
