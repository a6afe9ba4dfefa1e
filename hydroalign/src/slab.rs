//! Memory-mapped column files.
//!
//! Every variable in an array store lives in its own slab: a fixed-size file
//! holding a 64-byte header followed by exactly one element per axis
//! position. Slabs are sized once at creation and never grow.
//!
//! # File Format
//!
//! ```text
//! [0..4)     magic  b"HYAX"
//! [4..8)     format version (u32 LE)
//! [8..12)    column kind (u32 LE): 1 = f64 values, 2 = fixed-width text
//! [12..16)   element width in bytes (u32 LE)
//! [16..24)   element count (u64 LE)
//! [24..32)   fill value bits (f64 LE), values columns only
//! [32..64)   reserved
//! [64..)     data region: element count * element width bytes
//! ```
//!
//! Text elements are NUL-padded to the column width.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{Result, SlabIoError};

/// Magic bytes identifying a hydroalign slab file.
const SLAB_MAGIC: [u8; 4] = *b"HYAX";

/// Current slab format version.
const SLAB_VERSION: u32 = 1;

/// Size of the slab header in bytes.
const HEADER_SIZE: usize = 64;

/// Width of value column entries in bytes.
const VALUE_WIDTH: u32 = 8;

/// Size of value column entries in bytes.
const VALUE_SIZE: usize = VALUE_WIDTH as usize;

/// What a slab's elements are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// `f64` values.
    Values,
    /// Fixed-width, NUL-padded text.
    Text,
}

impl ColumnKind {
    fn tag(self) -> u32 {
        match self {
            Self::Values => 1,
            Self::Text => 2,
        }
    }

    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Values),
            2 => Some(Self::Text),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Values => "values",
            Self::Text => "text",
        }
    }
}

/// Decoded slab header.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SlabHeader {
    kind: ColumnKind,
    width: u32,
    len: u64,
    fill: f64,
}

impl SlabHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&SLAB_MAGIC);
        buf[4..8].copy_from_slice(&SLAB_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&self.kind.tag().to_le_bytes());
        buf[12..16].copy_from_slice(&self.width.to_le_bytes());
        buf[16..24].copy_from_slice(&self.len.to_le_bytes());
        buf[24..32].copy_from_slice(&self.fill.to_bits().to_le_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::CorruptedSlab`] if the header is invalid.
    fn decode(buf: &[u8], path: &str) -> Result<Self> {
        let corrupted = |reason: String| SlabIoError::CorruptedSlab {
            path: path.to_string(),
            reason,
        };

        if buf[0..4] != SLAB_MAGIC {
            return Err(corrupted(format!(
                "invalid magic bytes: expected {:?}, found {:?}",
                SLAB_MAGIC,
                &buf[0..4]
            ))
            .into());
        }

        let version = read_u32(buf, 4);
        if version != SLAB_VERSION {
            return Err(corrupted(format!(
                "unsupported version: expected {SLAB_VERSION}, found {version}"
            ))
            .into());
        }

        let tag = read_u32(buf, 8);
        let kind = ColumnKind::from_tag(tag)
            .ok_or_else(|| corrupted(format!("unknown column kind {tag}")))?;

        let width = read_u32(buf, 12);
        if width == 0 || (kind == ColumnKind::Values && width != VALUE_WIDTH) {
            return Err(corrupted(format!("invalid element width {width} for {} column", kind.name())).into());
        }

        Ok(Self {
            kind,
            width,
            len: read_u64(buf, 16),
            fill: f64::from_bits(read_u64(buf, 24)),
        })
    }

    fn file_size(&self) -> Option<usize> {
        usize::try_from(self.len)
            .ok()?
            .checked_mul(self.width as usize)?
            .checked_add(HEADER_SIZE)
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Memory-mapped column file.
///
/// # Thread Safety
///
/// Slab is designed for single-writer access. The owning store serializes
/// writers with its lock file.
#[derive(Debug)]
pub struct Slab {
    /// Memory mapping of the slab file.
    mmap: MmapMut,
    /// Decoded header, cached for offset calculations.
    header: SlabHeader,
    /// Path to the slab file (for error reporting).
    path: String,
}

impl Slab {
    /// Creates an `f64` column of `len` elements, all set to `fill`.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError`] if file creation or memory mapping fails.
    pub fn create_values<P: AsRef<Path>>(path: P, len: usize, fill: f64) -> Result<Self> {
        let header = SlabHeader {
            kind: ColumnKind::Values,
            width: VALUE_WIDTH,
            len: len as u64,
            fill,
        };
        let mut slab = Self::create(path.as_ref(), header)?;

        let fill_bytes = fill.to_le_bytes();
        for chunk in slab.mmap[HEADER_SIZE..].chunks_exact_mut(VALUE_SIZE) {
            chunk.copy_from_slice(&fill_bytes);
        }

        Ok(slab)
    }

    /// Creates a text column of `len` elements, each `width` bytes, all empty.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError`] if file creation or memory mapping fails.
    pub fn create_text<P: AsRef<Path>>(path: P, len: usize, width: u32) -> Result<Self> {
        let header = SlabHeader {
            kind: ColumnKind::Text,
            width,
            len: len as u64,
            fill: 0.0,
        };
        // A fresh file is zero-filled, which is already all-NUL text.
        Self::create(path.as_ref(), header)
    }

    fn create(path: &Path, header: SlabHeader) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();
        let write_failed = |source: std::io::Error| SlabIoError::WriteFailed {
            path: path_str.clone(),
            offset: 0,
            source,
        };

        let file_size = header.file_size().ok_or_else(|| SlabIoError::CorruptedSlab {
            path: path_str.clone(),
            reason: format!("{} elements of {} bytes overflow", header.len, header.width),
        })?;

        // create_new: a slab never silently replaces another.
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(write_failed)?;

        file.set_len(file_size as u64).map_err(write_failed)?;

        // SAFETY: The file was just created by us with the correct size, and the
        // store's lock file keeps other writers away from it.
        let mut mmap = unsafe { MmapMut::map_mut(&file).map_err(write_failed)? };

        mmap[..HEADER_SIZE].copy_from_slice(&header.encode());

        Ok(Self {
            mmap,
            header,
            path: path_str,
        })
    }

    /// Opens an existing slab file, validating its header and size.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError`] if the file cannot be opened, is corrupted,
    /// or memory mapping fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();
        let read_failed = |source: std::io::Error| SlabIoError::ReadFailed {
            path: path_str.clone(),
            offset: 0,
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(read_failed)?;

        // SAFETY: The file was opened read/write; the store's lock file keeps
        // concurrent writers from truncating it while mapped.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(read_failed)? };

        if mmap.len() < HEADER_SIZE {
            return Err(SlabIoError::CorruptedSlab {
                path: path_str,
                reason: format!(
                    "file too small: {} bytes, expected at least {}",
                    mmap.len(),
                    HEADER_SIZE
                ),
            }
            .into());
        }

        let header = SlabHeader::decode(&mmap[..HEADER_SIZE], &path_str)?;
        if header.file_size() != Some(mmap.len()) {
            return Err(SlabIoError::CorruptedSlab {
                path: path_str,
                reason: format!(
                    "file size mismatch: {} bytes for {} elements of {} bytes",
                    mmap.len(),
                    header.len,
                    header.width
                ),
            }
            .into());
        }

        Ok(Self {
            mmap,
            header,
            path: path_str,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        // file_size() succeeded on create/open, so len fits in usize.
        #[allow(clippy::cast_possible_truncation)]
        let len = self.header.len as usize;
        len
    }

    /// Whether the slab holds no elements.
    pub fn is_empty(&self) -> bool {
        self.header.len == 0
    }

    /// Column kind.
    pub fn kind(&self) -> ColumnKind {
        self.header.kind
    }

    /// Element width in bytes.
    pub fn width(&self) -> u32 {
        self.header.width
    }

    /// Fill value of a values column.
    pub fn fill(&self) -> f64 {
        self.header.fill
    }

    fn expect_kind(&self, expected: ColumnKind) -> Result<()> {
        if self.header.kind == expected {
            Ok(())
        } else {
            Err(SlabIoError::WrongKind {
                path: self.path.clone(),
                expected: expected.name(),
                actual: self.header.kind.name(),
            }
            .into())
        }
    }

    fn check_bounds(&self, start: usize, length: usize) -> Result<()> {
        let len = self.len();
        match start.checked_add(length) {
            Some(end) if end <= len => Ok(()),
            _ => Err(SlabIoError::BoundsViolation { start, length, len }.into()),
        }
    }

    fn element_range(&self, index: usize) -> std::ops::Range<usize> {
        let width = self.header.width as usize;
        let offset = HEADER_SIZE + index * width;
        offset..offset + width
    }

    /// Reads the value at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::WrongKind`] on a text column and
    /// [`SlabIoError::BoundsViolation`] if `index` is out of range.
    pub fn read_value(&self, index: usize) -> Result<f64> {
        self.expect_kind(ColumnKind::Values)?;
        self.check_bounds(index, 1)?;

        let mut bytes = [0u8; VALUE_SIZE];
        bytes.copy_from_slice(&self.mmap[self.element_range(index)]);
        Ok(f64::from_le_bytes(bytes))
    }

    /// Reads every value in order.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::WrongKind`] on a text column.
    pub fn read_values(&self) -> Result<Vec<f64>> {
        self.expect_kind(ColumnKind::Values)?;

        Ok(self.mmap[HEADER_SIZE..]
            .chunks_exact(VALUE_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; VALUE_SIZE];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect())
    }

    /// Writes `values` to positions `start..start + values.len()`.
    ///
    /// The whole range is checked before anything is written, so an
    /// out-of-range call leaves the slab untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::WrongKind`] on a text column and
    /// [`SlabIoError::BoundsViolation`] if the range does not fit.
    pub fn write_values(&mut self, start: usize, values: &[f64]) -> Result<()> {
        self.expect_kind(ColumnKind::Values)?;
        self.check_bounds(start, values.len())?;

        let begin = HEADER_SIZE + start * VALUE_SIZE;
        let end = begin + values.len() * VALUE_SIZE;
        for (chunk, value) in self.mmap[begin..end]
            .chunks_exact_mut(VALUE_SIZE)
            .zip(values)
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }

        Ok(())
    }

    /// Reads the text at `index`, without NUL padding.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::WrongKind`] on a values column,
    /// [`SlabIoError::BoundsViolation`] if `index` is out of range, and
    /// [`SlabIoError::CorruptedSlab`] if the bytes are not UTF-8.
    pub fn read_text(&self, index: usize) -> Result<String> {
        self.expect_kind(ColumnKind::Text)?;
        self.check_bounds(index, 1)?;

        let raw = &self.mmap[self.element_range(index)];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());

        std::str::from_utf8(&raw[..end])
            .map(str::to_string)
            .map_err(|e| {
                SlabIoError::CorruptedSlab {
                    path: self.path.clone(),
                    reason: format!("element {index} is not UTF-8: {e}"),
                }
                .into()
            })
    }

    /// Writes `text` at `index`, NUL-padding it to the column width.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::WrongKind`] on a values column,
    /// [`SlabIoError::BoundsViolation`] if `index` is out of range, and
    /// [`SlabIoError::TextTooLong`] if `text` does not fit.
    pub fn write_text(&mut self, index: usize, text: &str) -> Result<()> {
        self.expect_kind(ColumnKind::Text)?;
        self.check_bounds(index, 1)?;

        let width = self.header.width as usize;
        if text.len() > width {
            return Err(SlabIoError::TextTooLong {
                length: text.len(),
                width,
            }
            .into());
        }

        let range = self.element_range(index);
        let cell = &mut self.mmap[range];
        cell[..text.len()].copy_from_slice(text.as_bytes());
        cell[text.len()..].fill(0);

        Ok(())
    }

    /// Syncs the memory mapping to disk.
    ///
    /// # Errors
    ///
    /// Returns [`SlabIoError::SyncFailed`] if the sync operation fails.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| {
            SlabIoError::SyncFailed {
                path: self.path.clone(),
                source: e,
            }
            .into()
        })
    }

    /// Returns the path to this slab file.
    pub fn path(&self) -> &str {
        &self.path
    }
}
