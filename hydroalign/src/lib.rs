//! # hydroalign
//!
//! Aligns irregular, variable-length hydrological time series onto a fixed,
//! pre-declared time axis and writes them into an array store.
//!
//! The destination axis is created once and can only ever be extended by new
//! variables, never amended. Each source series therefore has to be placed
//! on it exactly: a value lands at axis position `p` only if the series'
//! timestamp equals the axis timestamp at `p`. Series that lag the axis start
//! are written at an offset; series that lead it, overrun it, or disagree
//! with it anywhere are skipped with a reason.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hydroalign::{ArrayStore, JsonSource, TimeAxis, Timestamp, convert};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Daily axis for the year 2000
//! let start = Timestamp::parse("2000-01-01 00:00:00 UTC")?;
//! let axis = TimeAxis::regular(&start, 86_400, 366)?;
//!
//! // Create the destination store, then convert an export directory into it
//! let mut store = ArrayStore::create("./flows", &axis, Some(-9999.0))?;
//! let report = convert(&JsonSource::new("./export"), &mut store)?;
//!
//! for outcome in &report.outcomes {
//!     println!("{}: written={}", outcome.variable(), outcome.is_written());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`decide`]: Pure alignment decision for one series against the axis
//! - [`write_aligned`]: Executes a decision: declare, offset-write, attach attributes, commit
//! - [`convert`]: Batch driver with per-variable fault isolation
//! - [`ArrayStore`]: Fixed time dimension plus full-length variables
//!
//! ## Modules
//!
//! - [`timestamp`]: Canonical `YYYY-MM-DD HH:MM:SS <TZ>` timestamps
//! - [`axis`]: The immutable destination time axis
//! - [`series`]: Source series and metadata coercion
//! - [`align`]: Alignment engine
//! - [`writer`]: Aligned writer and per-variable outcomes
//! - [`store`]: Array store lifecycle, variables, attributes
//! - [`slab`]: Memory-mapped column file format
//! - [`source`]: Source store trait and implementations
//! - [`batch`]: Batch driver and report
//! - [`config`]: Store creation config
//! - [`error`]: Error types and skip reasons

pub mod align;
pub mod axis;
pub mod batch;
pub mod config;
pub mod error;
pub mod series;
pub mod slab;
pub mod source;
pub mod store;
pub mod timestamp;
pub mod writer;

// Re-export primary API types at crate root for convenience.
pub use align::{AlignmentDecision, decide};
pub use axis::TimeAxis;
pub use batch::{BatchReport, convert};
pub use config::{AxisConfig, ConvertConfig};
pub use error::{HydroError, Result, SkipReason};
pub use series::{Metadata, SourceSeries};
pub use source::{JsonSource, MemorySource, SourceStore, VariableId};
pub use store::{ArrayStore, OpenMode, PendingVariable};
pub use timestamp::Timestamp;
pub use writer::{WriteOutcome, write_aligned};
