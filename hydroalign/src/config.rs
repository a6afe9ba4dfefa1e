//! Conversion configuration.
//!
//! A [`ConvertConfig`] describes the destination store to create: the shape
//! of its time axis and the fill value for unwritten positions. It is loaded
//! from JSON and validated before any store is touched.
//!
//! ```json
//! {
//!   "axis": {
//!     "start": "2000-01-01 00:00:00 UTC",
//!     "step_seconds": 86400,
//!     "length": 366
//!   },
//!   "fill_value": -9999.0
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::axis::TimeAxis;
use crate::error::{ConfigError, Result};
use crate::timestamp::Timestamp;

/// Shape of a regular time axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// First timestamp, in canonical form.
    pub start: String,
    /// Seconds between consecutive timestamps.
    pub step_seconds: i64,
    /// Number of timestamps.
    pub length: usize,
}

/// Configuration for creating a destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// The destination time axis.
    pub axis: AxisConfig,
    /// Value of unwritten positions. NaN when absent.
    #[serde(default)]
    pub fill_value: Option<f64>,
}

impl ConvertConfig {
    /// Loads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] if the file
    /// cannot be loaded, and any [`validate`](Self::validate) error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    /// Parses and validates a config from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid JSON and any
    /// [`validate`](Self::validate) error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the axis has no steps, a non-positive step,
    /// a non-canonical start, or the fill value is not finite.
    pub fn validate(&self) -> Result<()> {
        if self.axis.length == 0 {
            return Err(ConfigError::ZeroLength.into());
        }

        if self.axis.step_seconds <= 0 {
            return Err(ConfigError::ZeroStep.into());
        }

        Timestamp::parse(&self.axis.start).map_err(ConfigError::InvalidStart)?;

        if let Some(value) = self.fill_value
            && !value.is_finite()
        {
            return Err(ConfigError::NonFiniteFill { value }.into());
        }

        Ok(())
    }

    /// Builds the configured axis.
    ///
    /// # Errors
    ///
    /// Returns a timestamp or axis error if the configuration is invalid or
    /// the axis runs out of date range.
    pub fn build_axis(&self) -> Result<TimeAxis> {
        let start = Timestamp::parse(&self.axis.start)?;
        TimeAxis::regular(&start, self.axis.step_seconds, self.axis.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HydroError;

    const DAILY: &str = r#"{
        "axis": {"start": "2000-01-01 00:00:00 UTC", "step_seconds": 86400, "length": 3},
        "fill_value": -9999.0
    }"#;

    #[test]
    fn test_parse_and_build_axis() {
        let config = ConvertConfig::from_json(DAILY).unwrap();
        assert_eq!(config.fill_value, Some(-9999.0));

        let axis = config.build_axis().unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis.last().to_string(), "2000-01-03 00:00:00 UTC");
    }

    #[test]
    fn test_fill_value_defaults_to_none() {
        let config = ConvertConfig::from_json(
            r#"{"axis": {"start": "2000-01-01 00:00:00 UTC", "step_seconds": 3600, "length": 24}}"#,
        )
        .unwrap();
        assert_eq!(config.fill_value, None);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ConvertConfig::from_json(DAILY).unwrap();

        config.axis.length = 0;
        assert!(matches!(
            config.validate(),
            Err(HydroError::Config(ConfigError::ZeroLength))
        ));

        config.axis.length = 3;
        config.axis.step_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(HydroError::Config(ConfigError::ZeroStep))
        ));

        config.axis.step_seconds = 60;
        config.axis.start = "2000-01-01".to_string();
        assert!(matches!(
            config.validate(),
            Err(HydroError::Config(ConfigError::InvalidStart(_)))
        ));

        config.axis.start = "2000-01-01 00:00:00 UTC".to_string();
        config.fill_value = Some(f64::INFINITY);
        assert!(matches!(
            config.validate(),
            Err(HydroError::Config(ConfigError::NonFiniteFill { .. }))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ConvertConfig::load(temp_dir.path().join("missing.json")),
            Err(HydroError::Config(ConfigError::Read { .. }))
        ));
    }
}
