// crates/gait-core/src/archive.rs
// ============================================================================
// Module: Gait Deterministic Archives
// Description: Deterministic zip emission and bounded zip reading.
// Purpose: Guarantee byte-identical artifact envelopes for identical inputs.
// Dependencies: crate::fsx, zip
// ============================================================================

//! ## Overview
//! Runpacks and evidence packs are zip envelopes. Writing is deterministic:
//! entries sorted lexically by path, fixed DOS-epoch timestamps, fixed 0644
//! mode, one compression method, no extra fields. Reading is bounded: entry
//! names are validated against traversal and per-entry decompressed size is
//! capped so hostile archives cannot exhaust memory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Cursor;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::fsx;
use crate::fsx::FsxError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Per-entry decompressed size cap (100 MiB) applied on read.
pub const MAX_ENTRY_BYTES: u64 = 100 * 1024 * 1024;

// ============================================================================
// SECTION: Entry Model
// ============================================================================

/// One archive entry to be written deterministically.
///
/// # Invariants
/// - `path` is relative, slash-separated, and traversal-free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative entry path.
    pub path: String,
    /// Entry content bytes.
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    /// Creates an archive entry.
    #[must_use]
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Archive read/write errors.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem primitive failed.
    #[error(transparent)]
    Fsx(#[from] FsxError),
    /// Zip container operation failed.
    #[error("zip error: {0}")]
    Zip(String),
    /// Entry exceeded the decompressed size cap.
    #[error("entry {path} of {size} bytes exceeds cap of {limit} bytes")]
    EntryTooLarge {
        /// Offending entry path.
        path: String,
        /// Declared decompressed size in bytes.
        size: u64,
        /// Configured cap in bytes.
        limit: u64,
    },
    /// Two entries shared the same path.
    #[error("duplicate archive entry: {path}")]
    DuplicateEntry {
        /// Duplicated entry path.
        path: String,
    },
}

// ============================================================================
// SECTION: Deterministic Write
// ============================================================================

/// Writes entries into a deterministic zip and returns its bytes.
///
/// Entries are sorted lexically by path; timestamps, modes, and compression
/// are fixed so identical inputs produce byte-identical archives.
///
/// # Errors
///
/// Returns [`ArchiveError`] on invalid entry paths, duplicates, or zip
/// container failures.
pub fn write_deterministic_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
    let mut ordered: Vec<&ArchiveEntry> = entries.iter().collect();
    ordered.sort_by(|left, right| left.path.cmp(&right.path));
    for window in ordered.windows(2) {
        if window[0].path == window[1].path {
            return Err(ArchiveError::DuplicateEntry {
                path: window[0].path.clone(),
            });
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    for entry in ordered {
        fsx::validate_archive_entry_path(&entry.path)?;
        writer
            .start_file(entry.path.as_str(), options)
            .map_err(|err| ArchiveError::Zip(err.to_string()))?;
        writer.write_all(&entry.bytes).map_err(|err| ArchiveError::Zip(err.to_string()))?;
    }

    let cursor = writer.finish().map_err(|err| ArchiveError::Zip(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Writes a deterministic zip atomically to `path`.
///
/// # Errors
///
/// Returns [`ArchiveError`] on archive failures or atomic-write failures.
pub fn write_deterministic_zip_file(
    path: &Path,
    entries: &[ArchiveEntry],
) -> Result<(), ArchiveError> {
    let bytes = write_deterministic_zip(entries)?;
    fsx::write_file_atomic(path, &bytes, fsx::DEFAULT_FILE_MODE)?;
    Ok(())
}

// ============================================================================
// SECTION: Bounded Read
// ============================================================================

/// Reads every entry of a zip file into a path-keyed map.
///
/// Entry names are validated against traversal and absolute paths; each
/// entry's declared decompressed size must be within [`MAX_ENTRY_BYTES`].
///
/// # Errors
///
/// Returns [`ArchiveError`] on container failures, unsafe entry names, or
/// oversized entries.
pub fn read_zip_entries(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    fsx::validate_local_path(path)?;
    let file = std::fs::File::open(path).map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| ArchiveError::Zip(err.to_string()))?;
    read_entries(&mut archive)
}

/// Reads every entry of an in-memory zip into a path-keyed map.
///
/// # Errors
///
/// Returns [`ArchiveError`] on container failures, unsafe entry names, or
/// oversized entries.
pub fn read_zip_bytes(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| ArchiveError::Zip(err.to_string()))?;
    read_entries(&mut archive)
}

/// Drains a zip archive into a path-keyed map with safety checks.
fn read_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut entries = BTreeMap::new();
    for index in 0 .. archive.len() {
        let mut entry =
            archive.by_index(index).map_err(|err| ArchiveError::Zip(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        fsx::validate_archive_entry_path(&name)?;
        if entry.size() > MAX_ENTRY_BYTES {
            return Err(ArchiveError::EntryTooLarge {
                path: name,
                size: entry.size(),
                limit: MAX_ENTRY_BYTES,
            });
        }
        let capacity = usize::try_from(entry.size()).unwrap_or(0);
        let mut bytes = Vec::with_capacity(capacity);
        entry.read_to_end(&mut bytes).map_err(|err| ArchiveError::Zip(err.to_string()))?;
        entries.insert(name, bytes);
    }
    Ok(entries)
}
