//! Error types for hydroalign.
//!
//! Errors are split by concern and folded into [`HydroError`]. Per-variable
//! alignment failures are deliberately *not* errors: they are reported as a
//! [`SkipReason`] inside a [`WriteOutcome`](crate::writer::WriteOutcome) so a
//! batch can carry on past them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for all hydroalign operations.
///
/// Any of these reaching the batch driver aborts the run. Source read
/// failures are the one exception and are turned into skips there.
#[derive(Error, Debug)]
pub enum HydroError {
    /// A timestamp could not be parsed or built.
    #[error("timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    /// A time axis violated its ordering invariants.
    #[error("axis error: {0}")]
    Axis(#[from] AxisError),

    /// A source series was structurally invalid.
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    /// Error opening, creating, or mutating an array store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error during slab I/O operations.
    #[error("slab I/O error: {0}")]
    SlabIo(#[from] SlabIoError),

    /// The source store failed to list or materialize series.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Conversion configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised when parsing canonical timestamps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The text is not in `YYYY-MM-DD HH:MM:SS <TZ>` form.
    #[error("malformed timestamp '{text}': {reason}")]
    Malformed {
        /// The offending text.
        text: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The zone label is empty, too long, or has unexpected characters.
    #[error("invalid zone label '{label}'")]
    InvalidZone {
        /// The offending label.
        label: String,
    },

    /// Adding an interval overflowed the representable date range.
    #[error("timestamp overflow adding {seconds}s to {base}")]
    Overflow {
        /// The starting timestamp, rendered canonically.
        base: String,
        /// The number of seconds added.
        seconds: i64,
    },
}

/// Errors raised when building a [`TimeAxis`](crate::axis::TimeAxis).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AxisError {
    /// An axis needs at least one timestamp.
    #[error("time axis is empty")]
    Empty,

    /// Timestamps must be strictly ascending, which also rules out duplicates.
    #[error("time axis is not strictly ascending at position {index}")]
    NotAscending {
        /// First position that is not greater than its predecessor.
        index: usize,
    },
}

/// Errors raised when building a [`SourceSeries`](crate::series::SourceSeries).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// Timestamps and values must be parallel sequences.
    #[error("series '{name}' has {timestamps} timestamps but {values} values")]
    LengthMismatch {
        /// Series name.
        name: String,
        /// Number of timestamps.
        timestamps: usize,
        /// Number of values.
        values: usize,
    },

    /// Timestamps must be strictly ascending.
    #[error("series '{name}' is not strictly ascending at index {index}")]
    NotAscending {
        /// Series name.
        name: String,
        /// First index that is not greater than its predecessor.
        index: usize,
    },
}

/// Errors that can occur when creating, opening, or writing an array store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store directory could not be created or accessed.
    #[error("failed to access store path '{path}': {source}")]
    DirectoryAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A store already exists at the target path.
    #[error("a store already exists at '{path}'")]
    AlreadyExists {
        /// The existing path.
        path: String,
    },

    /// The metadata file (meta.json) is corrupted or invalid.
    #[error("corrupted metadata file: {reason}")]
    CorruptedMetadata {
        /// Description of what was invalid about the metadata.
        reason: String,
    },

    /// Failed to serialize or parse metadata JSON.
    #[error("failed to serialize metadata: {0}")]
    MetadataSerialize(#[from] serde_json::Error),

    /// Store is already locked by another writer.
    #[error("store is locked by another writer")]
    StoreLocked,

    /// A mutating call was made on a store opened read-only.
    #[error("store was opened read-only")]
    ReadOnly,

    /// A variable with this name is already defined.
    #[error("variable '{name}' already exists")]
    VariableExists {
        /// The conflicting name.
        name: String,
    },

    /// The requested variable is not defined.
    #[error("variable '{name}' not found")]
    VariableNotFound {
        /// The missing name.
        name: String,
    },

    /// Variable names are restricted to `[A-Za-z0-9_.-]` and
    /// [`MAX_VARIABLE_NAME_LEN`](crate::store::MAX_VARIABLE_NAME_LEN) bytes.
    #[error("invalid variable name '{name}'")]
    InvalidVariableName {
        /// The rejected name.
        name: String,
    },

    /// The pending variable no longer holds its slab.
    #[error("variable '{name}' is closed")]
    VariableClosed {
        /// The variable name.
        name: String,
    },

    /// The caller's notion of the axis length disagrees with the store.
    #[error("axis length mismatch: caller expected {expected}, store has {actual}")]
    DimensionMismatch {
        /// Length the caller aligned against.
        expected: usize,
        /// Length of the store's time dimension.
        actual: usize,
    },
}

/// Errors that can occur during slab I/O operations.
#[derive(Error, Debug)]
pub enum SlabIoError {
    /// Failed to open or map a slab file for reading.
    #[error("failed to read slab '{path}' at offset {offset}: {source}")]
    ReadFailed {
        /// The slab file path.
        path: String,
        /// The byte offset where the read failed.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create, size, or map a slab file for writing.
    #[error("failed to write slab '{path}' at offset {offset}: {source}")]
    WriteFailed {
        /// The slab file path.
        path: String,
        /// The byte offset where the write failed.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to sync slab file to disk.
    #[error("failed to sync slab '{path}' to disk: {source}")]
    SyncFailed {
        /// The slab file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Slab file is corrupted or has invalid format.
    #[error("slab '{path}' is corrupted: {reason}")]
    CorruptedSlab {
        /// The slab file path.
        path: String,
        /// Description of the corruption.
        reason: String,
    },

    /// Attempted to access beyond slab boundaries.
    #[error("access beyond slab bounds: start {start} + length {length} > element count {len}")]
    BoundsViolation {
        /// First element index of the access.
        start: usize,
        /// Number of elements accessed.
        length: usize,
        /// Number of elements in the slab.
        len: usize,
    },

    /// The operation does not apply to this column kind.
    #[error("slab '{path}' is a {actual} column, expected {expected}")]
    WrongKind {
        /// The slab file path.
        path: String,
        /// Kind the operation needs.
        expected: &'static str,
        /// Kind found in the header.
        actual: &'static str,
    },

    /// Text does not fit in the fixed-width column.
    #[error("text of {length} bytes exceeds column width {width}")]
    TextTooLong {
        /// Byte length of the text.
        length: usize,
        /// Declared column width.
        width: usize,
    },
}

/// Errors raised by a [`SourceStore`](crate::source::SourceStore).
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not enumerate its variables.
    #[error("failed to list source variables in '{location}': {source}")]
    Listing {
        /// Where the listing was attempted.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A series could not be read.
    #[error("failed to read series '{path}': {reason}")]
    Read {
        /// The source path of the series.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// A series file was not valid JSON for the export format.
    #[error("failed to parse series file '{file}': {source}")]
    Parse {
        /// The file that failed to parse.
        file: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A series was read but is not a valid series.
    #[error("invalid series '{path}': {reason}")]
    Invalid {
        /// The source path of the series.
        path: String,
        /// Description of the problem.
        reason: String,
    },
}

/// Errors raised by [`ConvertConfig::validate`](crate::config::ConvertConfig::validate).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// The config file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`ConvertConfig`](crate::config::ConvertConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The axis must have at least one step.
    #[error("axis length must be > 0")]
    ZeroLength,

    /// The step between axis timestamps must be positive.
    #[error("axis step must be > 0 seconds")]
    ZeroStep,

    /// The start timestamp is not canonical.
    #[error("invalid axis start: {0}")]
    InvalidStart(#[from] TimestampError),

    /// The fill value must be finite when given.
    #[error("fill value must be finite, got {value}")]
    NonFiniteFill {
        /// The rejected value.
        value: f64,
    },
}

/// Why a variable was not written.
///
/// This is the per-variable reason taxonomy surfaced in reports. Every
/// variant is local to one variable; none of them stops a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// The series' first timestamp does not occur on the axis.
    #[serde(rename = "no_overlap")]
    NoTemporalOverlap,
    /// The series would run past the end of the fixed-length axis.
    #[serde(rename = "runs_past_axis_end")]
    AxisOverrun,
    /// Positions overlap but at least one timestamp differs.
    #[serde(rename = "elementwise_mismatch")]
    ElementwiseMismatch,
    /// The destination already has a variable with this name.
    #[serde(rename = "name_collision")]
    VariableNameCollision,
    /// The destination name cannot be used as a variable name.
    #[serde(rename = "invalid_name")]
    InvalidVariableName,
    /// The source store could not materialize the series.
    #[serde(rename = "source_read")]
    SourceRead,
}

impl SkipReason {
    /// Stable reason code used in reports.
    pub fn code(self) -> &'static str {
        match self {
            Self::NoTemporalOverlap => "no_overlap",
            Self::AxisOverrun => "runs_past_axis_end",
            Self::ElementwiseMismatch => "elementwise_mismatch",
            Self::VariableNameCollision => "name_collision",
            Self::InvalidVariableName => "invalid_name",
            Self::SourceRead => "source_read",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Type alias for `Result<T, HydroError>`.
pub type Result<T> = std::result::Result<T, HydroError>;
