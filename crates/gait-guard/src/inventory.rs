// crates/gait-guard/src/inventory.rs
// ============================================================================
// Module: Inventory Snapshots
// Description: Inventory snapshot parsing with an mtime-keyed cache.
// Purpose: Attach workspace inventories to evidence packs cheaply.
// Dependencies: crate::pack, gait-core, serde
// ============================================================================

//! ## Overview
//! An inventory snapshot lists files with digests. Snapshots parse from
//! JSON through a process-scoped cache keyed by the cleaned source path and
//! its mtime; entries invalidate when the source changes and the cache
//! evicts its oldest entries beyond a fixed capacity. Snapshots can also be
//! produced by scanning a directory deterministically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

use gait_core::hashing::digest_bytes;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;

use crate::pack::GuardError;

// ============================================================================
// SECTION: Snapshot Model
// ============================================================================

/// One file entry inside an inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// File path relative to the inventory root.
    pub path: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub sha256: String,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// An inventory snapshot (`inventory_snapshot_*.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Source path the snapshot describes.
    pub source_path: String,
    /// Source mtime in unix seconds, when known.
    #[serde(default)]
    pub source_mtime_unix: Option<i64>,
    /// File entries sorted by path.
    pub entries: Vec<InventoryEntry>,
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Maximum cached snapshots before eviction.
const CACHE_CAPACITY: usize = 16;

/// One cache slot with its freshness and recency markers.
struct CacheSlot {
    /// Source mtime at parse time.
    mtime: i64,
    /// Monotonic access stamp for eviction ordering.
    stamp: u64,
    /// Parsed snapshot.
    snapshot: Arc<InventorySnapshot>,
}

/// Process-scoped inventory cache state.
struct CacheState {
    /// Slots keyed by cleaned source path.
    slots: BTreeMap<PathBuf, CacheSlot>,
    /// Monotonic access counter.
    counter: u64,
}

/// Returns the process-scoped cache.
fn cache() -> &'static Mutex<CacheState> {
    static CACHE: OnceLock<Mutex<CacheState>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(CacheState {
            slots: BTreeMap::new(),
            counter: 0,
        })
    })
}

/// Reads a file's mtime in unix seconds.
fn mtime_unix(path: &Path) -> Result<i64, GuardError> {
    let metadata = fs::metadata(path).map_err(|err| GuardError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let modified = metadata.modified().map_err(|err| GuardError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let seconds = modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Ok(seconds)
}

/// Loads an inventory snapshot, consulting the mtime-keyed cache.
///
/// # Errors
///
/// Returns [`GuardError`] when the source is unreadable or malformed.
pub fn load_inventory(path: &Path) -> Result<Arc<InventorySnapshot>, GuardError> {
    let clean: PathBuf = path.components().collect();
    let mtime = mtime_unix(&clean)?;

    if let Ok(mut state) = cache().lock() {
        state.counter = state.counter.wrapping_add(1);
        let counter = state.counter;
        if let Some(slot) = state.slots.get_mut(&clean)
            && slot.mtime == mtime
        {
            slot.stamp = counter;
            return Ok(Arc::clone(&slot.snapshot));
        }
    }

    let bytes = fs::read(&clean).map_err(|err| GuardError::Io {
        path: clean.clone(),
        reason: err.to_string(),
    })?;
    let snapshot: InventorySnapshot =
        serde_json::from_slice(&bytes).map_err(|err| GuardError::Parse {
            path: clean.clone(),
            reason: err.to_string(),
        })?;
    let snapshot = Arc::new(snapshot);

    if let Ok(mut state) = cache().lock() {
        state.counter = state.counter.wrapping_add(1);
        let stamp = state.counter;
        state.slots.insert(
            clean,
            CacheSlot {
                mtime,
                stamp,
                snapshot: Arc::clone(&snapshot),
            },
        );
        while state.slots.len() > CACHE_CAPACITY {
            let oldest = state
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.stamp)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    state.slots.remove(&key);
                }
                None => break,
            }
        }
    }

    Ok(snapshot)
}

// ============================================================================
// SECTION: Directory Scan
// ============================================================================

/// Builds an inventory snapshot by scanning a directory deterministically.
///
/// Entries are sorted by relative path; symlinks are not followed.
///
/// # Errors
///
/// Returns [`GuardError`] when the directory cannot be read.
pub fn snapshot_directory(dir: &Path) -> Result<InventorySnapshot, GuardError> {
    let mut entries = Vec::new();
    collect_entries(dir, dir, &mut entries)?;
    entries.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(InventorySnapshot {
        header: ArtifactHeader::new(ids::SCOUT_INVENTORY_SNAPSHOT),
        source_path: dir.display().to_string(),
        source_mtime_unix: mtime_unix(dir).ok(),
        entries,
    })
}

/// Recursively collects file entries under a root.
fn collect_entries(
    root: &Path,
    dir: &Path,
    entries: &mut Vec<InventoryEntry>,
) -> Result<(), GuardError> {
    let listing = fs::read_dir(dir).map_err(|err| GuardError::Io {
        path: dir.to_path_buf(),
        reason: err.to_string(),
    })?;
    for entry in listing.filter_map(Result::ok) {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|err| GuardError::Io {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            collect_entries(root, &path, entries)?;
            continue;
        }
        let bytes = fs::read(&path).map_err(|err| GuardError::Io {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        entries.push(InventoryEntry {
            path: relative,
            sha256: digest_bytes(&bytes).as_str().to_string(),
            size_bytes: bytes.len() as u64,
        });
    }
    Ok(())
}
