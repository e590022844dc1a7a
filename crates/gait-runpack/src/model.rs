// crates/gait-runpack/src/model.rs
// ============================================================================
// Module: Runpack Data Model
// Description: Runpack manifest, run record, and captured stream entries.
// Purpose: Provide canonical runpack indices for offline verification.
// Dependencies: gait-context, gait-core, serde
// ============================================================================

//! ## Overview
//! Runpack manifests index the artifact entries with deterministic per-file
//! hashes. The `manifest_digest` is computed over the canonical form of
//! `{capture_mode, files, run_id}` with the digest and signature fields
//! excluded, so verifiers can recompute it from the archive alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use gait_context::ContextEnvelope;
use gait_context::ContextError;
use gait_context::RunRefs;
use gait_core::archive::ArchiveError;
use gait_core::fsx::FsxError;
use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema::ArtifactHeader;
use gait_core::signing::ArtifactSignature;
use gait_core::signing::SigningError;

// ============================================================================
// SECTION: Entry Paths
// ============================================================================

/// Archive path of the runpack manifest.
pub const MANIFEST_PATH: &str = "manifest.json";
/// Archive path of the run record.
pub const RUN_PATH: &str = "run.json";
/// Archive path of the captured intent stream.
pub const INTENTS_PATH: &str = "intents.jsonl";
/// Archive path of the captured result stream.
pub const RESULTS_PATH: &str = "results.jsonl";
/// Archive path of the context references.
pub const REFS_PATH: &str = "refs.json";
/// Archive path of the optional context envelope.
pub const CONTEXT_ENVELOPE_PATH: &str = "context_envelope.json";
/// Archive path of session events inside checkpoint runpacks.
pub const SESSION_EVENTS_PATH: &str = "session_events.jsonl";

// ============================================================================
// SECTION: Capture Mode
// ============================================================================

/// How run content was captured into the pack.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Content is referenced by digest without raw payloads.
    #[default]
    Reference,
    /// Raw payloads are embedded in the pack.
    Raw,
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// One declared file inside a runpack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Archive-relative file path.
    pub path: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub sha256: String,
}

/// Runpack manifest indexing the archive contents.
///
/// # Invariants
/// - Every declared file exists in the archive with a matching digest.
/// - `files` are sorted by path.
/// - `manifest_digest` matches [`manifest_digest`] over the manifest fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunpackManifest {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Run identifier.
    pub run_id: String,
    /// Capture mode for the pack.
    #[serde(default)]
    pub capture_mode: CaptureMode,
    /// Declared files with digests, sorted by path.
    pub files: Vec<ManifestFile>,
    /// Digest over the canonical manifest fields.
    pub manifest_digest: String,
    /// Detached signatures over `manifest_digest`.
    #[serde(default)]
    pub signatures: Vec<ArtifactSignature>,
}

/// Canonical digest input for a runpack manifest.
///
/// The digest and signature fields are excluded by construction.
#[derive(Serialize)]
struct ManifestDigestInput<'a> {
    /// Capture mode for the pack.
    capture_mode: CaptureMode,
    /// Declared files with digests.
    files: &'a [ManifestFile],
    /// Run identifier.
    run_id: &'a str,
}

/// Computes the manifest digest over `{capture_mode, files, run_id}`.
///
/// # Errors
///
/// Returns [`RunpackError::Hash`] when canonicalization fails.
pub fn manifest_digest(
    run_id: &str,
    capture_mode: CaptureMode,
    files: &[ManifestFile],
) -> Result<Digest, RunpackError> {
    let input = ManifestDigestInput {
        capture_mode,
        files,
        run_id,
    };
    Ok(digest_canonical_json(&input)?)
}

// ============================================================================
// SECTION: Run Record
// ============================================================================

/// Timeline event inside the run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Event label.
    pub event: String,
    /// Event timestamp (RFC3339 UTC).
    pub at: String,
}

/// Run-level metadata captured into `run.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Run identifier.
    pub run_id: String,
    /// Captured environment key-value pairs.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Run timeline events.
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
}

// ============================================================================
// SECTION: Stream Entries
// ============================================================================

/// One captured intent, one line of `intents.jsonl`.
///
/// # Invariants
/// - `intent_id` is unique within a runpack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentEntry {
    /// Intent identifier, the replay join key.
    pub intent_id: String,
    /// Capture sequence when assigned.
    #[serde(default)]
    pub sequence: Option<u64>,
    /// Tool name the intent targets.
    pub tool_name: String,
    /// Canonical digest of the normalized intent.
    #[serde(default)]
    pub intent_digest: String,
    /// Full normalized intent request, when captured.
    #[serde(default)]
    pub request: Option<Value>,
}

/// Result status for a captured entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Tool execution succeeded.
    Ok,
    /// Tool execution failed.
    Error,
}

/// One captured result, one line of `results.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Intent identifier this result answers.
    pub intent_id: String,
    /// Result status.
    pub status: ResultStatus,
    /// Tool exit code when one applies.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Canonical digest of the result output.
    #[serde(default)]
    pub result_digest: String,
    /// Captured output, when `capture_mode` is raw.
    #[serde(default)]
    pub output: Option<Value>,
    /// Error description for failed executions.
    #[serde(default)]
    pub error: Option<String>,
    /// Observation timestamp (RFC3339 UTC).
    #[serde(default)]
    pub observed_at: String,
}

// ============================================================================
// SECTION: Runpack Value
// ============================================================================

/// Draft content for writing a runpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunpackDraft {
    /// Run-level metadata.
    pub run: RunRecord,
    /// Captured intents.
    pub intents: Vec<IntentEntry>,
    /// Captured results.
    pub results: Vec<ResultEntry>,
    /// Context references.
    pub refs: RunRefs,
    /// Optional context envelope.
    pub context_envelope: Option<ContextEnvelope>,
}

/// A fully read and verified runpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runpack {
    /// Verified manifest.
    pub manifest: RunpackManifest,
    /// Run-level metadata.
    pub run: RunRecord,
    /// Captured intents.
    pub intents: Vec<IntentEntry>,
    /// Captured results.
    pub results: Vec<ResultEntry>,
    /// Normalized context references.
    pub refs: RunRefs,
    /// Context envelope when the pack carries one.
    pub context_envelope: Option<ContextEnvelope>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runpack read, write, and verification errors.
///
/// # Invariants
/// - `Verification` carries the complete missing/mismatched file lists.
#[derive(Debug, Error)]
pub enum RunpackError {
    /// Archive container failure.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(#[from] FsxError),
    /// Canonicalization or digesting failure.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Context normalization failure.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Signature creation or verification failure.
    #[error(transparent)]
    Signature(#[from] SigningError),
    /// Required archive entry is absent.
    #[error("missing runpack entry: {path}")]
    MissingEntry {
        /// Absent entry path.
        path: String,
    },
    /// Archive entry failed to parse.
    #[error("invalid runpack entry {path}: {reason}")]
    Parse {
        /// Offending entry path.
        path: String,
        /// Parse failure description.
        reason: String,
    },
    /// Declared files are missing or carry mismatched hashes.
    #[error("runpack verification failed: {} missing, {} mismatched", missing_files.len(), hash_mismatches.len())]
    Verification {
        /// Declared files absent from the archive.
        missing_files: Vec<String>,
        /// Declared files whose hashes do not match.
        hash_mismatches: Vec<String>,
    },
    /// Stored manifest digest does not match the recomputed value.
    #[error("manifest digest mismatch: stored {stored}, computed {computed}")]
    ManifestDigestMismatch {
        /// Digest stored in the manifest.
        stored: String,
        /// Digest recomputed from the manifest fields.
        computed: String,
    },
    /// Required context evidence lacks a set digest.
    #[error("context evidence mode is required but context_set_digest is empty")]
    MissingContextDigest,
    /// Envelope digest does not match the refs summary digest.
    #[error("context digest continuity broken: refs {refs}, envelope {envelope}")]
    ContextDigestMismatch {
        /// Digest recorded in the refs summary.
        refs: String,
        /// Digest recorded in the envelope.
        envelope: String,
    },
    /// Duplicate intent identifier in the intent stream.
    #[error("duplicate intent id: {intent_id}")]
    DuplicateIntent {
        /// Duplicated intent identifier.
        intent_id: String,
    },
}

impl From<RunpackError> for gait_core::ClassifiedError {
    fn from(err: RunpackError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            RunpackError::Archive(inner) => inner.into(),
            RunpackError::Fsx(inner) => inner.into(),
            RunpackError::Hash(inner) => inner.into(),
            RunpackError::Context(inner) => inner.into(),
            RunpackError::Signature(inner) => inner.into(),
            other => {
                let (category, code) = match &other {
                    RunpackError::Parse { .. } => (ErrorCategory::InvalidInput, "runpack_parse"),
                    RunpackError::DuplicateIntent { .. } => {
                        (ErrorCategory::InvalidInput, "duplicate_intent")
                    }
                    RunpackError::MissingEntry { .. } => {
                        (ErrorCategory::VerificationFailed, "missing_entry")
                    }
                    RunpackError::Verification { .. } => {
                        (ErrorCategory::VerificationFailed, "runpack_verification_failed")
                    }
                    RunpackError::ManifestDigestMismatch { .. } => {
                        (ErrorCategory::VerificationFailed, "manifest_digest_mismatch")
                    }
                    RunpackError::MissingContextDigest => {
                        (ErrorCategory::VerificationFailed, "context_evidence_missing")
                    }
                    RunpackError::ContextDigestMismatch { .. } => {
                        (ErrorCategory::VerificationFailed, "context_set_digest_mismatch")
                    }
                    _ => (ErrorCategory::InternalFailure, "internal_failure"),
                };
                Self::new(category, code, other.to_string()).with_cause(other)
            }
        }
    }
}
