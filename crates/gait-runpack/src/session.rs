// crates/gait-runpack/src/session.rs
// ============================================================================
// Module: Session Journal
// Description: Append-only session event journal with cross-process locking.
// Purpose: Assign strictly monotonic sequences under concurrent writers.
// Dependencies: crate::model, gait-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The session journal is NDJSON: one event per line with a strictly
//! monotonic `sequence` starting at 1. A sidecar state file
//! `<journal>.state.json` carries `last_sequence` and `checkpoint_cursor`;
//! every append acquires the cross-process lock, reads state, writes the
//! event line, and updates state atomically before releasing.
//!
//! Lock budgets come from the `standard` or `swarm` profile; exhaustion
//! surfaces as a retryable contention error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use gait_core::env;
use gait_core::env::EnvError;
use gait_core::fsx;
use gait_core::fsx::AppendLock;
use gait_core::fsx::FsxError;
use gait_core::fsx::LockOptions;
use gait_core::fsx::LockProfile;
use gait_core::hashing::canonical_json_bytes;
use gait_core::timestamp;

use crate::model::RunpackError;

// ============================================================================
// SECTION: Event Model
// ============================================================================

/// One session journal event.
///
/// # Invariants
/// - `sequence` is strictly monotonic within a journal, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session identifier.
    pub session_id: String,
    /// Run identifier when the event belongs to a run.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Strictly monotonic sequence number.
    pub sequence: u64,
    /// Event kind label.
    pub kind: String,
    /// Event payload, when one applies.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Recording timestamp (RFC3339 UTC).
    #[serde(default)]
    pub recorded_at: String,
}

/// Draft of an event before a sequence is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionEventDraft {
    /// Run identifier when the event belongs to a run.
    pub run_id: Option<String>,
    /// Event kind label.
    pub kind: String,
    /// Event payload, when one applies.
    pub payload: Option<Value>,
}

/// Sidecar state persisted next to the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Last assigned sequence number.
    pub last_sequence: u64,
    /// Highest sequence covered by a checkpoint.
    pub checkpoint_cursor: u64,
}

/// Session summary for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session identifier.
    pub session_id: String,
    /// Events currently present in the journal.
    pub event_count: u64,
    /// Last assigned sequence number.
    pub last_sequence: u64,
    /// Highest sequence covered by a checkpoint.
    pub checkpoint_cursor: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session journal errors.
///
/// # Invariants
/// - `LockContention` is retryable; everything else is not.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Cross-process lock budget exhausted.
    #[error("session lock contention after {waited_ms} ms")]
    LockContention {
        /// Milliseconds spent waiting before giving up.
        waited_ms: u64,
    },
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(FsxError),
    /// Journal or state content failed to parse.
    #[error("session parse error at {path}: {reason}")]
    Parse {
        /// Offending file path.
        path: PathBuf,
        /// Parse failure description.
        reason: String,
    },
    /// Journal has not been started at the given path.
    #[error("session journal not started: {path}")]
    NotStarted {
        /// Expected journal path.
        path: PathBuf,
    },
    /// Reserved environment configuration is malformed.
    #[error(transparent)]
    Env(#[from] EnvError),
    /// Checkpoint runpack operation failed.
    #[error(transparent)]
    Runpack(#[from] RunpackError),
    /// Checkpoint chain invariant broken.
    #[error("session chain invalid: {reason}")]
    Chain {
        /// Broken invariant description.
        reason: String,
    },
}

impl From<FsxError> for SessionError {
    fn from(err: FsxError) -> Self {
        match err {
            FsxError::LockContention {
                waited_ms, ..
            } => Self::LockContention {
                waited_ms,
            },
            other => Self::Fsx(other),
        }
    }
}

impl From<SessionError> for gait_core::ClassifiedError {
    fn from(err: SessionError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            SessionError::Fsx(inner) => inner.into(),
            SessionError::Env(inner) => inner.into(),
            SessionError::Runpack(inner) => inner.into(),
            other => {
                let (category, code) = match &other {
                    SessionError::LockContention { .. } => {
                        (ErrorCategory::StateContention, "session_lock_contention")
                    }
                    SessionError::Parse { .. } => (ErrorCategory::InvalidInput, "session_parse"),
                    SessionError::NotStarted { .. } => {
                        (ErrorCategory::DependencyMissing, "session_not_started")
                    }
                    SessionError::Chain { .. } => {
                        (ErrorCategory::VerificationFailed, "session_chain_invalid")
                    }
                    _ => (ErrorCategory::InternalFailure, "internal_failure"),
                };
                Self::new(category, code, other.to_string()).with_cause(other)
            }
        }
    }
}

// ============================================================================
// SECTION: Journal Handle
// ============================================================================

/// Handle to a session journal on disk.
///
/// The handle is cheap to clone; every operation re-reads state under the
/// cross-process lock, so clones in different threads or processes stay
/// serialized.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    /// Journal file path (`<journal>.jsonl`).
    path: PathBuf,
    /// Sidecar state path (`<journal>.state.json`).
    state_path: PathBuf,
    /// Session identifier.
    session_id: String,
    /// Lock acquisition options.
    options: LockOptions,
}

impl SessionJournal {
    /// Starts a new session journal, creating the journal and state files.
    ///
    /// Validates the reserved encryption key configuration so misconfigured
    /// hosts fail fast at session start.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when validation or file creation fails.
    pub fn start(path: &Path, session_id: &str) -> Result<Self, SessionError> {
        env::encryption_key()?;
        fsx::validate_local_path(path)?;
        let journal = Self::attach(path, session_id);
        if !journal.state_path.exists() {
            journal.write_state(&SessionState::default())?;
        }
        if !path.exists() {
            fsx::write_file_atomic(path, b"", fsx::DEFAULT_FILE_MODE)?;
        }
        Ok(journal)
    }

    /// Attaches to an existing journal without touching the filesystem.
    #[must_use]
    pub fn attach(path: &Path, session_id: &str) -> Self {
        let mut state_name = path.as_os_str().to_os_string();
        state_name.push(".state.json");
        Self {
            path: path.to_path_buf(),
            state_path: PathBuf::from(state_name),
            session_id: session_id.to_string(),
            options: LockProfile::from_env().options(),
        }
    }

    /// Returns the journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the lock options in effect.
    #[must_use]
    pub const fn lock_options(&self) -> &LockOptions {
        &self.options
    }

    /// Appends one event, assigning the next sequence under the lock.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LockContention`] (retryable) when the lock
    /// budget is exhausted, and I/O or parse errors otherwise.
    pub fn append(&self, draft: SessionEventDraft) -> Result<SessionEvent, SessionError> {
        let _lock = AppendLock::acquire(&self.path, &self.options)?;
        let mut state = self.read_state()?;
        let sequence = state.last_sequence.saturating_add(1);

        let event = SessionEvent {
            session_id: self.session_id.clone(),
            run_id: draft.run_id,
            sequence,
            kind: draft.kind,
            payload: draft.payload,
            recorded_at: timestamp::now_rfc3339(),
        };
        let line = canonical_json_bytes(&event).map_err(|err| SessionError::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        let line = String::from_utf8(line).map_err(|err| SessionError::Parse {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        fsx::append_line_unlocked(&self.path, &line, fsx::DEFAULT_FILE_MODE)?;

        state.last_sequence = sequence;
        self.write_state(&state)?;
        Ok(event)
    }

    /// Reads every event currently present in the journal.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the journal is absent or malformed.
    pub fn events(&self) -> Result<Vec<SessionEvent>, SessionError> {
        let text = fs::read_to_string(&self.path).map_err(|_| SessionError::NotStarted {
            path: self.path.clone(),
        })?;
        let mut events = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(line).map_err(|err| SessionError::Parse {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Returns the session status summary.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the journal or state is unreadable.
    pub fn status(&self) -> Result<SessionStatus, SessionError> {
        let state = self.read_state()?;
        let event_count = self.events()?.len() as u64;
        Ok(SessionStatus {
            session_id: self.session_id.clone(),
            event_count,
            last_sequence: state.last_sequence,
            checkpoint_cursor: state.checkpoint_cursor,
        })
    }

    /// Removes events fully covered by checkpoints, keeping the chain intact.
    ///
    /// Returns the number of removed events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when locking or rewriting fails.
    pub fn compact(&self) -> Result<u64, SessionError> {
        let _lock = AppendLock::acquire(&self.path, &self.options)?;
        let state = self.read_state()?;
        let events = self.events()?;
        let (covered, retained): (Vec<_>, Vec<_>) =
            events.into_iter().partition(|event| event.sequence <= state.checkpoint_cursor);

        let mut bytes = Vec::new();
        for event in &retained {
            let line = canonical_json_bytes(event).map_err(|err| SessionError::Parse {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
            bytes.extend_from_slice(&line);
            bytes.push(b'\n');
        }
        fsx::write_file_atomic(&self.path, &bytes, fsx::DEFAULT_FILE_MODE)?;
        Ok(covered.len() as u64)
    }

    /// Reads the sidecar state file.
    pub(crate) fn read_state(&self) -> Result<SessionState, SessionError> {
        let bytes = fs::read(&self.state_path).map_err(|_| SessionError::NotStarted {
            path: self.state_path.clone(),
        })?;
        serde_json::from_slice(&bytes).map_err(|err| SessionError::Parse {
            path: self.state_path.clone(),
            reason: err.to_string(),
        })
    }

    /// Writes the sidecar state file atomically.
    pub(crate) fn write_state(&self, state: &SessionState) -> Result<(), SessionError> {
        let bytes = canonical_json_bytes(state).map_err(|err| SessionError::Parse {
            path: self.state_path.clone(),
            reason: err.to_string(),
        })?;
        fsx::write_file_atomic(&self.state_path, &bytes, fsx::DEFAULT_FILE_MODE)?;
        Ok(())
    }
}
