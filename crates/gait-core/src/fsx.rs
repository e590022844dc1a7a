// crates/gait-core/src/fsx.rs
// ============================================================================
// Module: Gait Atomic Filesystem I/O
// Description: Atomic file writes and cross-process append locking.
// Purpose: Serialize shared-state mutation without in-process mutex substitutes.
// Dependencies: crate::env, std, thiserror
// ============================================================================

//! ## Overview
//! Two primitives carry all shared-state writes in the kernel: an atomic
//! whole-file write (sibling temp, fsync, rename, parent-dir fsync) and a
//! line append guarded by a cross-process lock file. The lock is a
//! message-passing discipline between processes: each acquirer either gets
//! the lock, waits with bounded backoff, or times out with a retryable
//! contention error. Stale locks older than a threshold are recovered.
//!
//! Paths are validated before use: local relative or absolute only, no
//! parent-directory traversal, no non-local network paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::env;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Counter distinguishing temp files created within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default permissions for artifact files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Filesystem primitive errors.
///
/// # Invariants
/// - `LockContention` is the only retryable variant.
#[derive(Debug, Error)]
pub enum FsxError {
    /// Underlying I/O operation failed.
    #[error("io failure at {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Path failed validation.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// Rejected path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },
    /// Lock acquisition exceeded the configured budget.
    #[error("lock contention at {path} after {waited_ms} ms")]
    LockContention {
        /// Lock file path.
        path: PathBuf,
        /// Milliseconds spent waiting before giving up.
        waited_ms: u64,
    },
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates a local filesystem path for kernel use.
///
/// Accepts relative or absolute local paths. Rejects empty paths, parent
/// traversal (`..`), and non-local network paths (UNC-style prefixes).
///
/// # Errors
///
/// Returns [`FsxError::InvalidPath`] when validation fails.
pub fn validate_local_path(path: &Path) -> Result<(), FsxError> {
    let display = path.display().to_string();
    if display.is_empty() {
        return Err(FsxError::InvalidPath {
            path: display,
            reason: "path is empty".to_string(),
        });
    }
    if display.starts_with("\\\\") || display.starts_with("//") {
        return Err(FsxError::InvalidPath {
            path: display,
            reason: "network paths are not local".to_string(),
        });
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(FsxError::InvalidPath {
                path: display,
                reason: "parent directory traversal is rejected".to_string(),
            });
        }
    }
    Ok(())
}

/// Validates a zip entry path on write and on read.
///
/// Entry paths must be relative, slash-separated, and free of traversal.
///
/// # Errors
///
/// Returns [`FsxError::InvalidPath`] when validation fails.
pub fn validate_archive_entry_path(entry: &str) -> Result<(), FsxError> {
    if entry.is_empty() {
        return Err(FsxError::InvalidPath {
            path: entry.to_string(),
            reason: "entry path is empty".to_string(),
        });
    }
    if entry.starts_with('/') || entry.starts_with('\\') || entry.contains(':') {
        return Err(FsxError::InvalidPath {
            path: entry.to_string(),
            reason: "entry path must be relative".to_string(),
        });
    }
    let traverses = entry
        .split(['/', '\\'])
        .any(|segment| segment == ".." || segment.is_empty() || segment == ".");
    if traverses {
        return Err(FsxError::InvalidPath {
            path: entry.to_string(),
            reason: "entry path must not traverse or contain empty segments".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Atomic Write
// ============================================================================

/// Writes bytes atomically: sibling temp file, fsync, chmod, rename, then
/// parent-directory fsync. The temp file is removed on any failure.
///
/// # Errors
///
/// Returns [`FsxError`] when validation or any I/O step fails.
pub fn write_file_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<(), FsxError> {
    validate_local_path(path)?;
    let parent = parent_dir(path);
    let temp_path = temp_sibling(path);

    let result = write_temp_then_rename(path, &temp_path, bytes, mode, &parent);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Performs the temp-write, rename, and directory sync steps.
fn write_temp_then_rename(
    path: &Path,
    temp_path: &Path,
    bytes: &[u8],
    mode: u32,
    parent: &Path,
) -> Result<(), FsxError> {
    {
        let mut file = File::create(temp_path).map_err(|source| FsxError::Io {
            path: temp_path.to_path_buf(),
            source,
        })?;
        file.write_all(bytes).map_err(|source| FsxError::Io {
            path: temp_path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| FsxError::Io {
            path: temp_path.to_path_buf(),
            source,
        })?;
    }
    set_mode(temp_path, mode)?;
    rename_over(temp_path, path)?;
    sync_dir(parent)
}

/// Renames temp onto the destination, with remove-then-rename on Windows.
fn rename_over(temp_path: &Path, path: &Path) -> Result<(), FsxError> {
    match fs::rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(first) => {
            if cfg!(windows) && path.exists() {
                fs::remove_file(path).map_err(|source| FsxError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                return fs::rename(temp_path, path).map_err(|source| FsxError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
            Err(FsxError::Io {
                path: path.to_path_buf(),
                source: first,
            })
        }
    }
}

/// Builds the sibling temp path for an atomic write.
fn temp_sibling(path: &Path) -> PathBuf {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().map_or_else(|| "artifact".to_string(), |name| {
        name.to_string_lossy().to_string()
    });
    let temp_name = format!(".{name}.tmp.{}.{counter}", std::process::id());
    parent_dir(path).join(temp_name)
}

/// Returns the parent directory, defaulting to the current directory.
fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Applies the file mode on platforms that support it.
#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), FsxError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// File modes are not applied on non-Unix platforms.
#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), FsxError> {
    Ok(())
}

/// Flushes directory metadata so renames survive power loss.
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<(), FsxError> {
    let dir = File::open(path).map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    dir.sync_all().map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory fsync is not available on non-Unix platforms.
#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<(), FsxError> {
    Ok(())
}

// ============================================================================
// SECTION: Lock Profiles
// ============================================================================

/// Lock acquisition tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Total wall-clock budget for acquisition.
    pub timeout: Duration,
    /// Sleep between acquisition attempts.
    pub retry_delay: Duration,
    /// Age beyond which a lock file is considered stale and recovered.
    pub stale_after: Duration,
}

/// Named lock profiles selected via `GAIT_SESSION_LOCK_PROFILE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockProfile {
    /// Single-writer optimized defaults.
    Standard,
    /// Longer timeouts and more retries for many concurrent writers.
    Swarm,
}

impl LockProfile {
    /// Resolves the profile from the environment, defaulting to standard.
    #[must_use]
    pub fn from_env() -> Self {
        match env::var(env::ENV_LOCK_PROFILE).as_deref() {
            Some("swarm") => Self::Swarm,
            _ => Self::Standard,
        }
    }

    /// Returns the profile's base options.
    #[must_use]
    pub const fn base_options(self) -> LockOptions {
        match self {
            Self::Standard => LockOptions {
                timeout: Duration::from_secs(30),
                retry_delay: Duration::from_millis(25),
                stale_after: Duration::from_secs(120),
            },
            Self::Swarm => LockOptions {
                timeout: Duration::from_secs(90),
                retry_delay: Duration::from_millis(50),
                stale_after: Duration::from_secs(300),
            },
        }
    }

    /// Returns options with environment overrides applied.
    #[must_use]
    pub fn options(self) -> LockOptions {
        let mut options = self.base_options();
        if let Some(seconds) = env::u64_var(env::ENV_LOCK_TIMEOUT) {
            options.timeout = Duration::from_secs(seconds);
        }
        if let Some(millis) = env::u64_var(env::ENV_LOCK_RETRY) {
            options.retry_delay = Duration::from_millis(millis);
        }
        if let Some(seconds) = env::u64_var(env::ENV_LOCK_STALE_AFTER) {
            options.stale_after = Duration::from_secs(seconds);
        }
        options
    }
}

// ============================================================================
// SECTION: Append Lock
// ============================================================================

/// Held cross-process lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct AppendLock {
    /// Lock file path removed on release.
    lock_path: PathBuf,
}

impl AppendLock {
    /// Acquires the lock for `path` by exclusive-creating `<path>.lock`.
    ///
    /// Stale locks older than `options.stale_after` are removed and retried.
    ///
    /// # Errors
    ///
    /// Returns [`FsxError::LockContention`] when the budget is exhausted and
    /// [`FsxError::Io`] for unexpected filesystem failures.
    pub fn acquire(path: &Path, options: &LockOptions) -> Result<Self, FsxError> {
        validate_local_path(path)?;
        let lock_path = lock_path_for(path);
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    let _ = file.sync_all();
                    return Ok(Self {
                        lock_path,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&lock_path, options.stale_after) {
                        let _ = fs::remove_file(&lock_path);
                        continue;
                    }
                    if started.elapsed() >= options.timeout {
                        return Err(FsxError::LockContention {
                            path: lock_path,
                            waited_ms: u64::try_from(started.elapsed().as_millis())
                                .unwrap_or(u64::MAX),
                        });
                    }
                    std::thread::sleep(options.retry_delay);
                }
                Err(source) => {
                    return Err(FsxError::Io {
                        path: lock_path,
                        source,
                    });
                }
            }
        }
    }
}

impl Drop for AppendLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Returns the lock file path for a guarded file.
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Returns true when the lock file's mtime exceeds the staleness threshold.
fn lock_is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    fs::metadata(lock_path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > stale_after)
}

// ============================================================================
// SECTION: Locked Append
// ============================================================================

/// Appends `line` plus a newline under the cross-process lock, fsyncing the
/// file and its parent directory.
///
/// # Errors
///
/// Returns [`FsxError::LockContention`] when the lock budget is exhausted
/// and [`FsxError::Io`] for filesystem failures.
pub fn append_line_locked(
    path: &Path,
    line: &str,
    mode: u32,
    options: &LockOptions,
) -> Result<(), FsxError> {
    let _lock = AppendLock::acquire(path, options)?;
    append_line_unlocked(path, line, mode)
}

/// Appends a line assuming the caller already holds the append lock.
///
/// # Errors
///
/// Returns [`FsxError::Io`] for filesystem failures.
pub fn append_line_unlocked(path: &Path, line: &str, mode: u32) -> Result<(), FsxError> {
    let existed = path.exists();
    let mut file =
        OpenOptions::new().append(true).create(true).open(path).map_err(|source| FsxError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    writeln!(file, "{line}").map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(|source| FsxError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !existed {
        set_mode(path, mode)?;
    }
    sync_dir(&parent_dir(path))
}
