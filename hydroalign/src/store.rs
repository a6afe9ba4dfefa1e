//! Array store: a fixed time dimension plus variables sized to it.
//!
//! # Design
//!
//! A store is a directory holding one fixed-length `time` dimension, a
//! character-encoded timestamp variable over it, and any number of `f64`
//! variables that all span the full dimension. Variables can be added but
//! the dimension is never resized and existing variables are never touched
//! again once committed.
//!
//! # File Layout
//!
//! ```text
//! store_dir/
//! ├── meta.json          <- Dimension, timestamp variable, committed variables + attributes
//! ├── time.slab          <- Canonical timestamps, TIMESTAMP_STRLEN bytes each
//! ├── vars/
//! │   ├── flow.slab      <- One values slab per variable
//! │   └── ...
//! └── .lock              <- Present while a writer holds the store
//! ```
//!
//! # Writing a variable
//!
//! [`ArrayStore::declare_variable`] returns a [`PendingVariable`] that
//! mutably borrows the store, so only one variable is in flight at a time.
//! Values and attributes go into the pending variable, and
//! [`PendingVariable::commit`] syncs the slab and then atomically rewrites
//! `meta.json`. A pending variable dropped without committing deletes its
//! slab, so readers never see a partially written variable.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::axis::TimeAxis;
use crate::error::{Result, SlabIoError, StoreError};
use crate::slab::{ColumnKind, Slab};
use crate::timestamp::{TIMESTAMP_STRLEN, Timestamp};

/// Metadata file format version.
const METADATA_VERSION: u32 = 1;

/// Name of the metadata file in the store directory.
const METADATA_FILE: &str = "meta.json";

/// Name of the timestamp slab in the store directory.
const TIME_SLAB_FILE: &str = "time.slab";

/// Directory holding variable slabs.
const VARIABLES_DIR: &str = "vars";

/// Name of the writer lock file.
const LOCK_FILE: &str = ".lock";

/// Extension of variable slab files.
const SLAB_EXTENSION: &str = ".slab";

/// Longest variable name whose slab file name still fits in 255 bytes.
pub const MAX_VARIABLE_NAME_LEN: usize = 255 - SLAB_EXTENSION.len();

/// Name of the time dimension and of its timestamp variable.
pub const TIME_NAME: &str = "time";

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Inspect only; no lock is taken and mutation is refused.
    ReadOnly,
    /// Exclusive writer; holds the lock file until the store is dropped.
    ReadWrite,
}

/// The fixed-length time dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMeta {
    /// Dimension name.
    pub name: String,
    /// Number of positions.
    pub length: usize,
}

/// The character-encoded timestamp variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeVariableMeta {
    /// Variable name.
    pub name: String,
    /// Declared maximum string length.
    pub strlen: usize,
    /// Slab file, relative to the store directory.
    pub file: String,
}

/// A committed `f64` variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMeta {
    /// Variable name.
    pub name: String,
    /// Dimension the variable spans.
    pub dimension: String,
    /// Slab file, relative to the store directory.
    pub file: String,
    /// Value of unwritten positions; `None` means NaN.
    pub fill_value: Option<f64>,
    /// String attributes.
    pub attributes: BTreeMap<String, String>,
}

impl VariableMeta {
    /// Fill value as an `f64`.
    pub fn fill(&self) -> f64 {
        self.fill_value.unwrap_or(f64::NAN)
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMetadata {
    version: u32,
    dimension: DimensionMeta,
    time_variable: TimeVariableMeta,
    /// Store-wide default fill value; `None` means NaN.
    fill_value: Option<f64>,
    variables: Vec<VariableMeta>,
}

/// Exclusive writer lock, released on drop.
#[derive(Debug)]
struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    fn acquire(store_path: &Path) -> Result<Self> {
        let path = store_path.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::StoreLocked.into());
            }
            Err(e) => {
                return Err(StoreError::DirectoryAccess {
                    path: path.display().to_string(),
                    source: e,
                }
                .into());
            }
        };

        // The pid is informational only.
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { path })
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

/// Handle on an array store directory.
///
/// # Thread Safety
///
/// A store is used from one thread. Callers that parallelize conversion must
/// serialize access to the handle; across processes the lock file admits a
/// single writer.
#[derive(Debug)]
pub struct ArrayStore {
    /// Path to the store directory.
    path: PathBuf,
    /// Parsed `meta.json`.
    meta: StoreMetadata,
    /// How the store was opened.
    mode: OpenMode,
    /// Held for the lifetime of a read-write handle.
    _lock: Option<WriterLock>,
}

impl ArrayStore {
    /// Creates a new store whose time dimension is `axis`.
    ///
    /// The returned handle is open read-write.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if anything exists at `path`
    /// - [`StoreError::DirectoryAccess`] if the directory cannot be created
    /// - [`SlabIoError`] if the timestamp slab cannot be written
    pub fn create<P: AsRef<Path>>(path: P, axis: &TimeAxis, fill_value: Option<f64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            return Err(StoreError::AlreadyExists {
                path: path.display().to_string(),
            }
            .into());
        }

        let vars_dir = path.join(VARIABLES_DIR);
        fs::create_dir_all(&vars_dir).map_err(|e| StoreError::DirectoryAccess {
            path: vars_dir.display().to_string(),
            source: e,
        })?;

        let lock = WriterLock::acquire(&path)?;

        #[allow(clippy::cast_possible_truncation)] // TIMESTAMP_STRLEN is a small constant
        let mut time_slab =
            Slab::create_text(path.join(TIME_SLAB_FILE), axis.len(), TIMESTAMP_STRLEN as u32)?;
        for (index, timestamp) in axis.as_slice().iter().enumerate() {
            time_slab.write_text(index, &timestamp.to_string())?;
        }
        time_slab.sync()?;

        let meta = StoreMetadata {
            version: METADATA_VERSION,
            dimension: DimensionMeta {
                name: TIME_NAME.to_string(),
                length: axis.len(),
            },
            time_variable: TimeVariableMeta {
                name: TIME_NAME.to_string(),
                strlen: TIMESTAMP_STRLEN,
                file: TIME_SLAB_FILE.to_string(),
            },
            fill_value: fill_value.filter(|v| v.is_finite()),
            variables: Vec::new(),
        };
        write_metadata(&path, &meta)?;

        debug!(path = %path.display(), len = axis.len(), "created array store");

        Ok(Self {
            path,
            meta,
            mode: OpenMode::ReadWrite,
            _lock: Some(lock),
        })
    }

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StoreLocked`] if `mode` is read-write and another writer holds the store
    /// - [`StoreError::DirectoryAccess`] if `meta.json` cannot be read
    /// - [`StoreError::CorruptedMetadata`] if `meta.json` is invalid
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let metadata_path = path.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(StoreError::DirectoryAccess {
                path: metadata_path.display().to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "no store metadata"),
            }
            .into());
        }

        let lock = match mode {
            OpenMode::ReadOnly => None,
            OpenMode::ReadWrite => Some(WriterLock::acquire(&path)?),
        };

        let meta = read_metadata(&path)?;

        debug!(
            path = %path.display(),
            ?mode,
            variables = meta.variables.len(),
            "opened array store"
        );

        Ok(Self {
            path,
            meta,
            mode,
            _lock: lock,
        })
    }

    /// Reads the time axis back from the timestamp variable.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::CorruptedSlab`] if the slab does not match the
    /// dimension or holds non-canonical text, and an axis error if the
    /// timestamps are not strictly ascending.
    pub fn read_axis(&self) -> Result<TimeAxis> {
        let slab = Slab::open(self.path.join(&self.meta.time_variable.file))?;
        let corrupted = |reason: String| SlabIoError::CorruptedSlab {
            path: slab.path().to_string(),
            reason,
        };

        if slab.kind() != ColumnKind::Text || slab.len() != self.meta.dimension.length {
            return Err(corrupted(format!(
                "expected a text column of {} elements, found {:?} with {}",
                self.meta.dimension.length,
                slab.kind(),
                slab.len()
            ))
            .into());
        }

        let mut timestamps = Vec::with_capacity(slab.len());
        for index in 0..slab.len() {
            let text = slab.read_text(index)?;
            let timestamp = Timestamp::parse(&text)
                .map_err(|e| corrupted(format!("position {index}: {e}")))?;
            timestamps.push(timestamp);
        }

        TimeAxis::new(timestamps)
    }

    /// Length of the time dimension.
    pub fn axis_len(&self) -> usize {
        self.meta.dimension.length
    }

    /// The time dimension.
    pub fn dimension(&self) -> &DimensionMeta {
        &self.meta.dimension
    }

    /// The timestamp variable.
    pub fn time_variable(&self) -> &TimeVariableMeta {
        &self.meta.time_variable
    }

    /// Store-wide default fill value.
    pub fn fill_value(&self) -> f64 {
        self.meta.fill_value.unwrap_or(f64::NAN)
    }

    /// Committed variables in declaration order.
    pub fn variables(&self) -> &[VariableMeta] {
        &self.meta.variables
    }

    /// A committed variable by name.
    pub fn variable(&self, name: &str) -> Option<&VariableMeta> {
        self.meta.variables.iter().find(|v| v.name == name)
    }

    /// Whether `name` is taken, including by the timestamp variable.
    pub fn has_variable(&self, name: &str) -> bool {
        name == self.meta.time_variable.name || self.variable(name).is_some()
    }

    /// Whether `name` would share a file with an existing variable on a
    /// case-insensitive filesystem.
    fn name_conflicts(&self, name: &str) -> bool {
        let file = variable_file(name);
        name.eq_ignore_ascii_case(&self.meta.time_variable.name)
            || self.meta.variables.iter().any(|v| {
                v.name.eq_ignore_ascii_case(name) || v.file.eq_ignore_ascii_case(&file)
            })
    }

    /// Reads every value of a committed variable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VariableNotFound`] for unknown names and
    /// [`SlabIoError`] if the slab cannot be read.
    pub fn read_variable(&self, name: &str) -> Result<Vec<f64>> {
        let meta = self.variable(name).ok_or_else(|| StoreError::VariableNotFound {
            name: name.to_string(),
        })?;

        Slab::open(self.path.join(&meta.file))?.read_values()
    }

    /// Declares a new variable spanning the whole time dimension.
    ///
    /// Every position starts at `missing_value`. The variable only becomes
    /// visible once [`PendingVariable::commit`] succeeds.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ReadOnly`] on a read-only handle
    /// - [`StoreError::InvalidVariableName`] for names outside `[A-Za-z0-9_.-]`
    ///   or longer than [`MAX_VARIABLE_NAME_LEN`]
    /// - [`StoreError::VariableExists`] if the name is taken, compared
    ///   ASCII case-insensitively
    /// - [`SlabIoError`] if the slab cannot be created
    pub fn declare_variable(&mut self, name: &str, missing_value: f64) -> Result<PendingVariable<'_>> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::ReadOnly.into());
        }

        if !is_valid_variable_name(name) {
            return Err(StoreError::InvalidVariableName {
                name: name.to_string(),
            }
            .into());
        }

        if self.name_conflicts(name) {
            return Err(StoreError::VariableExists {
                name: name.to_string(),
            }
            .into());
        }

        let file = variable_file(name);
        let slab_path = self.path.join(&file);

        // Left behind by an interrupted writer; we hold the lock, so nobody
        // owns it. No committed file can alias it once name_conflicts passed.
        if slab_path.exists() {
            debug!(path = %slab_path.display(), "removing orphaned slab");
            fs::remove_file(&slab_path).map_err(|e| SlabIoError::WriteFailed {
                path: slab_path.display().to_string(),
                offset: 0,
                source: e,
            })?;
        }

        let slab = Slab::create_values(&slab_path, self.axis_len(), missing_value)?;

        debug!(variable = name, len = slab.len(), "declared variable");

        Ok(PendingVariable {
            store: self,
            name: name.to_string(),
            file,
            slab: Some(slab),
            fill_value: missing_value,
            attributes: BTreeMap::new(),
            committed: false,
        })
    }

    /// Deletes the store directory and everything in it.
    ///
    /// The writer lock is held until every other entry is gone, so no other
    /// writer can open the store while it is half deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] on a read-only handle and
    /// [`StoreError::DirectoryAccess`] if an entry cannot be removed.
    pub fn destroy(self) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::ReadOnly.into());
        }

        let access = |path: &Path, source: std::io::Error| StoreError::DirectoryAccess {
            path: path.display().to_string(),
            source,
        };

        let entries = fs::read_dir(&self.path).map_err(|e| access(&self.path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| access(&self.path, e))?;
            if entry.file_name().to_str() == Some(LOCK_FILE) {
                continue;
            }

            let path = entry.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| access(&path, e))?;
        }

        let path = self.path.clone();
        // Releases the lock; without meta.json the directory can no longer be opened.
        drop(self);
        fs::remove_dir(&path).map_err(|e| access(&path, e))?;

        debug!(path = %path.display(), "destroyed array store");
        Ok(())
    }

    /// Path to the store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the store was opened.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// A declared variable that is not yet visible in the store.
///
/// Dropping it without calling [`commit`](Self::commit) deletes its slab.
#[derive(Debug)]
pub struct PendingVariable<'a> {
    store: &'a mut ArrayStore,
    name: String,
    file: String,
    slab: Option<Slab>,
    fill_value: f64,
    attributes: BTreeMap<String, String>,
    committed: bool,
}

impl PendingVariable<'_> {
    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of positions, equal to the store's dimension length.
    pub fn len(&self) -> usize {
        self.slab.as_ref().map_or(0, Slab::len)
    }

    /// Whether the variable has no positions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `values` at positions `start_index..start_index + values.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::BoundsViolation`] if the range does not fit;
    /// nothing is written in that case. Returns [`StoreError::VariableClosed`]
    /// if the slab has already been released.
    pub fn write_at(&mut self, start_index: usize, values: &[f64]) -> Result<()> {
        let Some(slab) = self.slab.as_mut() else {
            return Err(StoreError::VariableClosed {
                name: self.name.clone(),
            }
            .into());
        };
        slab.write_values(start_index, values)
    }

    /// Sets a string attribute, replacing any previous value for `key`.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Attributes set so far.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Flushes the values and publishes the variable with its attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::SyncFailed`] or a metadata write error; the
    /// variable is discarded in either case.
    pub fn commit(mut self) -> Result<()> {
        let Some(slab) = self.slab.as_ref() else {
            return Err(StoreError::VariableClosed {
                name: self.name.clone(),
            }
            .into());
        };
        slab.sync()?;

        let variable = VariableMeta {
            name: self.name.clone(),
            dimension: self.store.meta.dimension.name.clone(),
            file: self.file.clone(),
            fill_value: Some(self.fill_value).filter(|v| v.is_finite()),
            attributes: std::mem::take(&mut self.attributes),
        };

        let mut meta = self.store.meta.clone();
        meta.variables.push(variable);
        write_metadata(&self.store.path, &meta)?;
        self.store.meta = meta;
        self.committed = true;

        debug!(variable = %self.name, "committed variable");
        Ok(())
    }
}

impl Drop for PendingVariable<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // Unmap before unlinking.
        let Some(slab) = self.slab.take() else {
            return;
        };
        let path = slab.path().to_string();
        drop(slab);

        if let Err(e) = fs::remove_file(&path) {
            warn!(%path, error = %e, "failed to remove uncommitted variable slab");
        }
    }
}

fn variable_file(name: &str) -> String {
    format!("{VARIABLES_DIR}/{name}{SLAB_EXTENSION}")
}

fn is_valid_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_VARIABLE_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn read_metadata(path: &Path) -> Result<StoreMetadata> {
    let metadata_path = path.join(METADATA_FILE);
    let metadata_json =
        fs::read_to_string(&metadata_path).map_err(|e| StoreError::DirectoryAccess {
            path: metadata_path.display().to_string(),
            source: e,
        })?;

    let meta: StoreMetadata =
        serde_json::from_str(&metadata_json).map_err(StoreError::MetadataSerialize)?;

    if meta.version != METADATA_VERSION {
        return Err(StoreError::CorruptedMetadata {
            reason: format!(
                "unsupported metadata version: expected {}, found {}",
                METADATA_VERSION, meta.version
            ),
        }
        .into());
    }

    if meta.dimension.length == 0 {
        return Err(StoreError::CorruptedMetadata {
            reason: "time dimension has zero length".to_string(),
        }
        .into());
    }

    if meta.time_variable.strlen < TIMESTAMP_STRLEN {
        return Err(StoreError::CorruptedMetadata {
            reason: format!(
                "timestamp strlen {} is shorter than the canonical {}",
                meta.time_variable.strlen, TIMESTAMP_STRLEN
            ),
        }
        .into());
    }

    if let Some(stray) = meta
        .variables
        .iter()
        .find(|v| v.dimension != meta.dimension.name)
    {
        return Err(StoreError::CorruptedMetadata {
            reason: format!(
                "variable '{}' spans unknown dimension '{}'",
                stray.name, stray.dimension
            ),
        }
        .into());
    }

    Ok(meta)
}

/// Writes `meta.json` via a temporary file and rename.
fn write_metadata(path: &Path, meta: &StoreMetadata) -> Result<()> {
    let metadata_json = serde_json::to_string_pretty(meta).map_err(StoreError::MetadataSerialize)?;

    let metadata_path = path.join(METADATA_FILE);
    let temp_path = path.join(format!("{METADATA_FILE}.tmp"));
    let access = |p: &Path, source: std::io::Error| StoreError::DirectoryAccess {
        path: p.display().to_string(),
        source,
    };

    fs::write(&temp_path, metadata_json).map_err(|e| access(&temp_path, e))?;
    fs::rename(&temp_path, &metadata_path).map_err(|e| access(&metadata_path, e))?;

    Ok(())
}
