// crates/gait-runpack/src/checkpoint.rs
// ============================================================================
// Module: Session Checkpoint Chain
// Description: Linked checkpoint packs over the session journal.
// Purpose: Make journal history tamper-evident and compactable.
// Dependencies: crate::{model, reader, session, writer}, gait-context, gait-core
// ============================================================================

//! ## Overview
//! A checkpoint freezes the journal events since the previous checkpoint
//! into a runpack (`checkpoint_<n>.zip`) and records a chain link whose
//! digest covers the previous link. Chain verification walks every link
//! confirming sequence continuity, runpack integrity, and digest-chain
//! continuity; compaction may then drop covered events from the journal
//! without losing evidence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use gait_context::RunRefs;
use gait_core::archive::ArchiveEntry;
use gait_core::archive::read_zip_entries;
use gait_core::fsx;
use gait_core::fsx::AppendLock;
use gait_core::hashing::Digest;
use gait_core::hashing::canonical_json_bytes;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;

use crate::model::RunRecord;
use crate::model::RunpackDraft;
use crate::model::SESSION_EVENTS_PATH;
use crate::reader::VerifyOptions;
use crate::reader::verify_zip;
use crate::session::SessionError;
use crate::session::SessionEvent;
use crate::session::SessionJournal;
use crate::writer::WriteOptions;
use crate::writer::write_runpack_bytes_with_extras;

// ============================================================================
// SECTION: Chain Model
// ============================================================================

/// Chain file name stored beside the journal.
const CHAIN_FILE_NAME: &str = "session_chain.json";

/// One checkpoint link in the session chain.
///
/// # Invariants
/// - `checkpoint_digest` covers the canonical link with its own digest
///   field empty; `prev_checkpoint_digest` chains to the previous link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    /// 1-based checkpoint index.
    pub checkpoint_index: u64,
    /// First journal sequence covered.
    pub sequence_start: u64,
    /// Last journal sequence covered.
    pub sequence_end: u64,
    /// Checkpoint runpack file name relative to the journal directory.
    pub runpack_path: String,
    /// Manifest digest of the checkpoint runpack.
    pub manifest_digest: String,
    /// Digest of the previous link (zero digest for the first).
    pub prev_checkpoint_digest: String,
    /// Digest of this link.
    pub checkpoint_digest: String,
}

/// The persisted checkpoint chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChain {
    /// Session identifier the chain belongs to.
    pub session_id: String,
    /// Ordered checkpoint links.
    #[serde(default)]
    pub checkpoints: Vec<SessionCheckpoint>,
}

/// Chain verification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// Count of checkpoint links verified.
    pub checkpoints_verified: usize,
    /// Broken invariants discovered during the walk.
    pub errors: Vec<String>,
    /// True when every invariant held.
    pub passed: bool,
}

// ============================================================================
// SECTION: Checkpointing
// ============================================================================

/// Freezes all uncheckpointed events into a new chain link.
///
/// # Errors
///
/// Returns [`SessionError::Chain`] when no new events exist and lock, I/O,
/// or runpack errors otherwise.
pub fn checkpoint_session(journal: &SessionJournal) -> Result<SessionCheckpoint, SessionError> {
    let _lock = AppendLock::acquire(journal.path(), journal.lock_options())?;
    let mut state = journal.read_state()?;
    let mut chain = read_chain(journal)?;

    let covered: Vec<SessionEvent> = journal
        .events()?
        .into_iter()
        .filter(|event| event.sequence > state.checkpoint_cursor)
        .collect();
    let Some(first) = covered.first() else {
        return Err(SessionError::Chain {
            reason: "no new events to checkpoint".to_string(),
        });
    };
    let Some(last) = covered.last() else {
        return Err(SessionError::Chain {
            reason: "no new events to checkpoint".to_string(),
        });
    };
    let sequence_start = first.sequence;
    let sequence_end = last.sequence;

    let checkpoint_index = chain.checkpoints.len() as u64 + 1;
    let runpack_name = format!("checkpoint_{checkpoint_index}.zip");
    let runpack_path = journal_dir(journal).join(&runpack_name);

    let (bytes, manifest) = build_checkpoint_runpack(journal, checkpoint_index, &covered)?;
    fsx::write_file_atomic(&runpack_path, &bytes, fsx::DEFAULT_FILE_MODE)?;

    let prev_checkpoint_digest = chain
        .checkpoints
        .last()
        .map_or_else(|| Digest::zero().as_str().to_string(), |prev| prev.checkpoint_digest.clone());

    let mut checkpoint = SessionCheckpoint {
        checkpoint_index,
        sequence_start,
        sequence_end,
        runpack_path: runpack_name,
        manifest_digest: manifest.manifest_digest,
        prev_checkpoint_digest,
        checkpoint_digest: String::new(),
    };
    checkpoint.checkpoint_digest = link_digest(&checkpoint)?;

    chain.checkpoints.push(checkpoint.clone());
    write_chain(journal, &chain)?;
    state.checkpoint_cursor = sequence_end;
    journal.write_state(&state)?;

    Ok(checkpoint)
}

/// Builds the checkpoint runpack carrying the covered journal events.
fn build_checkpoint_runpack(
    journal: &SessionJournal,
    checkpoint_index: u64,
    covered: &[SessionEvent],
) -> Result<(Vec<u8>, crate::model::RunpackManifest), SessionError> {
    let mut events_bytes = Vec::new();
    for event in covered {
        let line = canonical_json_bytes(event).map_err(|err| SessionError::Chain {
            reason: err.to_string(),
        })?;
        events_bytes.extend_from_slice(&line);
        events_bytes.push(b'\n');
    }

    let draft = RunpackDraft {
        run: RunRecord {
            header: ArtifactHeader::deterministic(ids::RUNPACK_RUN),
            run_id: format!("{}-checkpoint-{checkpoint_index}", journal.session_id()),
            env: std::collections::BTreeMap::new(),
            timeline: Vec::new(),
        },
        intents: Vec::new(),
        results: Vec::new(),
        refs: RunRefs::empty(),
        context_envelope: None,
    };
    let extras = vec![ArchiveEntry::new(SESSION_EVENTS_PATH, events_bytes)];
    let (bytes, manifest) =
        write_runpack_bytes_with_extras(&draft, &WriteOptions::default(), &extras)?;
    Ok((bytes, manifest))
}

/// Computes a link digest with the digest field cleared.
fn link_digest(checkpoint: &SessionCheckpoint) -> Result<String, SessionError> {
    let mut cleared = checkpoint.clone();
    cleared.checkpoint_digest = String::new();
    let digest = digest_canonical_json(&cleared).map_err(|err| SessionError::Chain {
        reason: err.to_string(),
    })?;
    Ok(digest.as_str().to_string())
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Walks the checkpoint chain confirming every invariant.
///
/// # Errors
///
/// Returns [`SessionError`] only for unreadable chain files; broken
/// invariants are reported in the returned [`ChainReport`].
pub fn verify_session_chain(journal: &SessionJournal) -> Result<ChainReport, SessionError> {
    let chain = read_chain(journal)?;
    let dir = journal_dir(journal);
    let mut errors = Vec::new();

    let mut expected_start = 1u64;
    let mut expected_prev = Digest::zero().as_str().to_string();
    for checkpoint in &chain.checkpoints {
        if checkpoint.sequence_start != expected_start {
            errors.push(format!(
                "checkpoint {} starts at {} but {} was expected",
                checkpoint.checkpoint_index, checkpoint.sequence_start, expected_start
            ));
        }
        if checkpoint.sequence_end < checkpoint.sequence_start {
            errors.push(format!(
                "checkpoint {} has inverted sequence range",
                checkpoint.checkpoint_index
            ));
        }
        if checkpoint.prev_checkpoint_digest != expected_prev {
            errors.push(format!(
                "checkpoint {} breaks digest chain continuity",
                checkpoint.checkpoint_index
            ));
        }
        match link_digest(checkpoint) {
            Ok(digest) if digest == checkpoint.checkpoint_digest => {}
            Ok(_) => errors.push(format!(
                "checkpoint {} digest does not match its content",
                checkpoint.checkpoint_index
            )),
            Err(err) => errors.push(format!(
                "checkpoint {} digest computation failed: {err}",
                checkpoint.checkpoint_index
            )),
        }
        verify_checkpoint_runpack(&dir, checkpoint, &mut errors);

        expected_start = checkpoint.sequence_end.saturating_add(1);
        expected_prev = checkpoint.checkpoint_digest.clone();
    }

    Ok(ChainReport {
        checkpoints_verified: chain.checkpoints.len(),
        passed: errors.is_empty(),
        errors,
    })
}

/// Verifies one checkpoint runpack and its covered event range.
fn verify_checkpoint_runpack(dir: &Path, checkpoint: &SessionCheckpoint, errors: &mut Vec<String>) {
    let path = dir.join(&checkpoint.runpack_path);
    match verify_zip(&path, &VerifyOptions::default()) {
        Ok(report) if report.passed => {
            if report.manifest_digest != checkpoint.manifest_digest {
                errors.push(format!(
                    "checkpoint {} manifest digest does not match the chain",
                    checkpoint.checkpoint_index
                ));
            }
        }
        Ok(_) => errors.push(format!(
            "checkpoint {} runpack failed integrity verification",
            checkpoint.checkpoint_index
        )),
        Err(err) => errors.push(format!(
            "checkpoint {} runpack unreadable: {err}",
            checkpoint.checkpoint_index
        )),
    }

    match read_checkpoint_events(&path) {
        Ok(events) => {
            let expected: Vec<u64> =
                (checkpoint.sequence_start ..= checkpoint.sequence_end).collect();
            let actual: Vec<u64> = events.iter().map(|event| event.sequence).collect();
            if expected != actual {
                errors.push(format!(
                    "checkpoint {} does not cover sequences {}..={}",
                    checkpoint.checkpoint_index, checkpoint.sequence_start, checkpoint.sequence_end
                ));
            }
        }
        Err(err) => errors.push(format!(
            "checkpoint {} events unreadable: {err}",
            checkpoint.checkpoint_index
        )),
    }
}

/// Reads the covered events entry from a checkpoint runpack.
fn read_checkpoint_events(path: &Path) -> Result<Vec<SessionEvent>, SessionError> {
    let entries = read_zip_entries(path).map_err(crate::model::RunpackError::from)?;
    let bytes = entries.get(SESSION_EVENTS_PATH).ok_or_else(|| SessionError::Chain {
        reason: format!("checkpoint runpack lacks {SESSION_EVENTS_PATH}"),
    })?;
    let text = std::str::from_utf8(bytes).map_err(|err| SessionError::Chain {
        reason: err.to_string(),
    })?;
    let mut events = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(line).map_err(|err| SessionError::Chain {
            reason: err.to_string(),
        })?;
        events.push(event);
    }
    Ok(events)
}

// ============================================================================
// SECTION: Chain Persistence
// ============================================================================

/// Returns the directory containing the journal.
fn journal_dir(journal: &SessionJournal) -> PathBuf {
    journal
        .path()
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the chain file path beside the journal.
fn chain_path(journal: &SessionJournal) -> PathBuf {
    journal_dir(journal).join(CHAIN_FILE_NAME)
}

/// Reads the chain file, defaulting to an empty chain.
fn read_chain(journal: &SessionJournal) -> Result<SessionChain, SessionError> {
    let path = chain_path(journal);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| SessionError::Parse {
            path,
            reason: err.to_string(),
        }),
        Err(_) => Ok(SessionChain {
            session_id: journal.session_id().to_string(),
            checkpoints: Vec::new(),
        }),
    }
}

/// Writes the chain file atomically.
fn write_chain(journal: &SessionJournal, chain: &SessionChain) -> Result<(), SessionError> {
    let path = chain_path(journal);
    let bytes = canonical_json_bytes(chain).map_err(|err| SessionError::Parse {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    fsx::write_file_atomic(&path, &bytes, fsx::DEFAULT_FILE_MODE)?;
    Ok(())
}
