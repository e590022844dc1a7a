// crates/gait-gate/src/trace.rs
// ============================================================================
// Module: Signed Trace Records
// Description: Trace record emission and signature verification.
// Purpose: Bind intent, policy, and verdict into tamper-evident evidence.
// Dependencies: crate::{eval, intent, policy}, gait-core, serde
// ============================================================================

//! ## Overview
//! A trace record links `intent_digest`, `policy_digest`, and the verdict.
//! Its digest is computed over the canonical record with `trace_id` and
//! `signatures` cleared; `trace_id` is `trace_` plus the digest's first
//! sixteen hex characters. Records are signed with Ed25519 and persisted
//! atomically; any field mutation breaks signature verification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use gait_core::fsx;
use gait_core::fsx::FsxError;
use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::canonical_json_bytes;
use gait_core::hashing::digest_bytes;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::ArtifactSignature;
use gait_core::signing::KeyPair;
use gait_core::signing::SigningError;
use gait_core::signing::VerifyingKey;
use gait_core::signing::sign_digest_hex;
use gait_core::signing::verify_digest_hex;
use gait_core::timestamp;

use crate::eval::GateResult;
use crate::intent::NormalizedIntent;
use crate::policy::Verdict;

// ============================================================================
// SECTION: Trace Record
// ============================================================================

/// Signed record of one gate decision.
///
/// # Invariants
/// - `trace_id` is `trace_` plus the first sixteen hex characters of the
///   record digest (computed with `trace_id` and `signatures` cleared).
/// - `reason_codes` and `violations` are sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Trace identifier derived from the record digest.
    pub trace_id: String,
    /// Tool name the intent targeted.
    pub tool_name: String,
    /// Canonical digest of the intent arguments.
    pub args_digest: String,
    /// Canonical digest of the normalized intent.
    pub intent_digest: String,
    /// Canonical digest of the evaluated policy.
    pub policy_digest: String,
    /// Verdict rendered by the gate.
    pub verdict: Verdict,
    /// Sorted, deduplicated reason codes.
    pub reason_codes: Vec<String>,
    /// Sorted, deduplicated constraint violations.
    pub violations: Vec<String>,
    /// Context set digest carried by the intent, when present.
    #[serde(default)]
    pub context_set_digest: Option<String>,
    /// Context evidence mode label, when present.
    #[serde(default)]
    pub context_evidence_mode: Option<String>,
    /// Count of context references, when present.
    #[serde(default)]
    pub context_ref_count: Option<u64>,
    /// Delegation reference, when the intent carried a chain.
    #[serde(default)]
    pub delegation_ref: Option<String>,
    /// Event identifier derived from the record digest and time.
    pub event_id: String,
    /// Observation timestamp (RFC3339 UTC).
    pub observed_at: String,
    /// Detached signatures over the record digest.
    #[serde(default)]
    pub signatures: Vec<ArtifactSignature>,
}

/// Result of a signed trace emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEmission {
    /// Trace identifier.
    pub trace_id: String,
    /// Path the record was persisted to.
    pub trace_path: PathBuf,
    /// Digest of the evaluated policy.
    pub policy_digest: String,
    /// Digest of the normalized intent.
    pub intent_digest: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trace emission and verification errors.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Canonicalization or digesting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Signature creation or verification failed.
    #[error(transparent)]
    Signature(#[from] SigningError),
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(#[from] FsxError),
    /// Stored trace identifier does not match the record digest.
    #[error("trace id mismatch: stored {stored}, derived {derived}")]
    TraceIdMismatch {
        /// Identifier stored in the record.
        stored: String,
        /// Identifier derived from the record digest.
        derived: String,
    },
    /// The record carries no signatures to verify.
    #[error("trace record is unsigned")]
    Unsigned,
}

impl From<TraceError> for gait_core::ClassifiedError {
    fn from(err: TraceError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            TraceError::Hash(inner) => inner.into(),
            TraceError::Signature(inner) => inner.into(),
            TraceError::Fsx(inner) => inner.into(),
            other => {
                let code = match &other {
                    TraceError::TraceIdMismatch { .. } => "trace_id_mismatch",
                    TraceError::Unsigned => "trace_unsigned",
                    _ => "internal_failure",
                };
                Self::new(ErrorCategory::VerificationFailed, code, other.to_string())
                    .with_cause(other)
            }
        }
    }
}

// ============================================================================
// SECTION: Digesting
// ============================================================================

/// Computes the record digest with identity and signatures cleared.
fn trace_digest(record: &TraceRecord) -> Result<Digest, TraceError> {
    let mut cleared = record.clone();
    cleared.trace_id = String::new();
    cleared.signatures = Vec::new();
    Ok(digest_canonical_json(&cleared)?)
}

// ============================================================================
// SECTION: Emission
// ============================================================================

/// Builds, signs, and atomically persists a trace record.
///
/// The record lands at `<dir>/<trace_id>.json` in canonical JSON form.
///
/// # Errors
///
/// Returns [`TraceError`] when digesting, signing, or persistence fails.
pub fn emit_signed_trace(
    dir: &Path,
    intent: &NormalizedIntent,
    result: &GateResult,
    policy_digest: &Digest,
    key: &KeyPair,
) -> Result<(TraceRecord, TraceEmission), TraceError> {
    let observed_at = timestamp::now_rfc3339();
    let context = &intent.request.context;

    let mut record = TraceRecord {
        header: ArtifactHeader::new(ids::GATE_TRACE_RECORD),
        trace_id: String::new(),
        tool_name: intent.request.tool_name.clone(),
        args_digest: intent.args_digest.as_str().to_string(),
        intent_digest: intent.intent_digest.as_str().to_string(),
        policy_digest: policy_digest.as_str().to_string(),
        verdict: result.verdict,
        reason_codes: result.reason_codes.clone(),
        violations: result.violations.clone(),
        context_set_digest: if context.context_set_digest.is_empty() {
            None
        } else {
            Some(context.context_set_digest.clone())
        },
        context_evidence_mode: context.context_evidence_mode.map(|mode| mode.as_str().to_string()),
        context_ref_count: if context.context_refs.is_empty() {
            None
        } else {
            Some(context.context_refs.len() as u64)
        },
        delegation_ref: intent
            .request
            .delegation
            .as_ref()
            .map(|chain| chain.delegation_ref.clone()),
        event_id: String::new(),
        observed_at: observed_at.clone(),
        signatures: Vec::new(),
    };

    let digest = trace_digest(&record)?;
    record.trace_id = format!("trace_{}", digest.short());
    record.event_id = event_id(&digest, &observed_at);
    record.signatures = vec![sign_digest_hex(key, &digest)];

    let bytes = canonical_json_bytes(&record)?;
    let trace_path = dir.join(format!("{}.json", record.trace_id));
    fsx::write_file_atomic(&trace_path, &bytes, fsx::DEFAULT_FILE_MODE)?;

    let emission = TraceEmission {
        trace_id: record.trace_id.clone(),
        trace_path,
        policy_digest: record.policy_digest.clone(),
        intent_digest: record.intent_digest.clone(),
    };
    Ok((record, emission))
}

/// Derives the event identifier from the record digest and time.
fn event_id(digest: &Digest, observed_at: &str) -> String {
    let seed = format!("{}:{observed_at}", digest.as_str());
    format!("evt_{}", digest_bytes(seed.as_bytes()).short())
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a trace record's identity and signatures.
///
/// Recomputes the record digest, checks `trace_id` derivation, and verifies
/// every attached signature. Any field mutation after signing fails here.
///
/// # Errors
///
/// Returns [`TraceError`] naming the first broken invariant.
pub fn verify_trace_record(record: &TraceRecord, key: &VerifyingKey) -> Result<(), TraceError> {
    let digest = trace_digest(record)?;
    let derived = format!("trace_{}", digest.short());
    if record.trace_id != derived {
        return Err(TraceError::TraceIdMismatch {
            stored: record.trace_id.clone(),
            derived,
        });
    }
    if record.signatures.is_empty() {
        return Err(TraceError::Unsigned);
    }
    for signature in &record.signatures {
        verify_digest_hex(key, signature, &digest)?;
    }
    Ok(())
}
