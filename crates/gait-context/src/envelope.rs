// crates/gait-context/src/envelope.rs
// ============================================================================
// Module: Context Envelope
// Description: Context envelope build, normalization, digesting, and parse.
// Purpose: Render retrieved-context evidence with order-independent digests.
// Dependencies: gait-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A context envelope captures the reference records an agent run consumed.
//! Records normalize deterministically (lowercased digests, epoch-defaulted
//! retrieval times, stable sort) before the set digest is computed, so the
//! digest witnesses content rather than capture order or wall-clock state.
//!
//! The set digest is computed over the runtime-masked record array: each
//! record's `retrieved_at` carries the deterministic epoch inside the digest
//! input. Retrieval times remain in the envelope for audit, but runtime-only
//! recaptures keep the same `context_set_digest`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::digest_canonical_json;
use gait_core::hashing::is_digest_hex;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::timestamp;
use gait_core::timestamp::DETERMINISTIC_EPOCH;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted envelope payload size on parse (1 MiB).
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Evidence collection mode for a context set.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// Evidence is recorded when available.
    #[default]
    BestEffort,
    /// Evidence must be present; gates fail closed without it.
    Required,
}

impl EvidenceMode {
    /// Returns the stable wire label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Required => "required",
        }
    }
}

/// Source immutability assessment for a reference record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Immutability {
    /// Immutability is unknown.
    #[default]
    Unknown,
    /// Source content may change under the same locator.
    Mutable,
    /// Source content is immutable under the locator.
    Immutable,
}

/// Redaction mode applied to a record or requested for an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// Record passes through unredacted.
    #[default]
    Raw,
    /// Locator and retrieval parameters redacted; digests preserved.
    Hashes,
    /// Digests zeroed and locator redacted; only shape remains.
    Metadata,
}

// ============================================================================
// SECTION: Reference Record
// ============================================================================

/// One retrieved-context reference inside an envelope.
///
/// # Invariants
/// - After normalization, digests are lowercase hex or empty.
/// - `retrieved_at` is RFC3339 UTC, defaulting to the deterministic epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Stable reference identifier.
    pub ref_id: String,
    /// Source family (for example `file`, `http`, `mcp`).
    pub source_type: String,
    /// Source locator within the source family.
    pub source_locator: String,
    /// Digest of the retrieval query, when one applies.
    #[serde(default)]
    pub query_digest: String,
    /// Digest of the retrieved content.
    #[serde(default)]
    pub content_digest: String,
    /// Retrieval timestamp (RFC3339 UTC).
    #[serde(default)]
    pub retrieved_at: String,
    /// Redaction mode already applied to this record.
    #[serde(default)]
    pub redaction_mode: RedactionMode,
    /// Source immutability assessment.
    #[serde(default)]
    pub immutability: Immutability,
    /// Freshness SLA in seconds, when one applies.
    #[serde(default)]
    pub freshness_sla_seconds: Option<u64>,
    /// Sensitivity label, when one applies.
    #[serde(default)]
    pub sensitivity_label: Option<String>,
    /// Retrieval parameters, when recorded.
    #[serde(default)]
    pub retrieval_params: Option<Value>,
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Deterministic evidence of the context references used during a run.
///
/// # Invariants
/// - `context_set_digest` matches the digest of the normalized, runtime-
///   masked record array.
/// - `records` are sorted by `(ref_id, source_type, source_locator,
///   content_digest)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Context set identifier.
    pub context_set_id: String,
    /// Order-independent digest over the normalized records.
    pub context_set_digest: String,
    /// Evidence collection mode.
    #[serde(default)]
    pub evidence_mode: EvidenceMode,
    /// Normalized reference records.
    pub records: Vec<ReferenceRecord>,
}

/// Options for building an envelope from raw records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvelopeOptions {
    /// Context set identifier.
    pub context_set_id: String,
    /// Evidence collection mode.
    pub evidence_mode: EvidenceMode,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Context envelope errors.
///
/// # Invariants
/// - Variants are stable for error classification.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A record digest was not valid lowercase hex.
    #[error("record {ref_id} carries invalid {field} hex: {value}")]
    InvalidDigest {
        /// Offending record identifier.
        ref_id: String,
        /// Offending digest field name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },
    /// A record timestamp was not valid RFC3339.
    #[error("record {ref_id} carries invalid retrieved_at: {value}")]
    InvalidTimestamp {
        /// Offending record identifier.
        ref_id: String,
        /// Rejected value.
        value: String,
    },
    /// Envelope payload exceeded the parse size cap.
    #[error("envelope payload of {actual} bytes exceeds cap of {limit} bytes")]
    PayloadTooLarge {
        /// Configured cap in bytes.
        limit: usize,
        /// Actual payload size in bytes.
        actual: usize,
    },
    /// Envelope JSON failed to parse.
    #[error("envelope parse error: {0}")]
    Parse(String),
    /// Canonicalization or digesting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Stored set digest does not match the recomputed value.
    #[error("context set digest mismatch: stored {stored}, computed {computed}")]
    DigestMismatch {
        /// Digest stored in the envelope.
        stored: String,
        /// Digest recomputed from the records.
        computed: String,
    },
}

impl From<ContextError> for gait_core::ClassifiedError {
    fn from(err: ContextError) -> Self {
        use gait_core::ErrorCategory;
        let (category, code) = match &err {
            ContextError::DigestMismatch { .. } => {
                (ErrorCategory::VerificationFailed, "context_set_digest_mismatch")
            }
            ContextError::Hash(_) => (ErrorCategory::InvalidInput, "canonicalization_failed"),
            ContextError::PayloadTooLarge { .. } => {
                (ErrorCategory::InvalidInput, "envelope_too_large")
            }
            ContextError::InvalidDigest { .. }
            | ContextError::InvalidTimestamp { .. }
            | ContextError::Parse(_) => (ErrorCategory::InvalidInput, "envelope_invalid"),
        };
        Self::new(category, code, err.to_string()).with_cause(err)
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes records in place: digest case, timestamp defaults, stable sort.
///
/// # Errors
///
/// Returns [`ContextError`] when a digest or timestamp is malformed.
pub fn normalize_records(records: &mut Vec<ReferenceRecord>) -> Result<(), ContextError> {
    for record in records.iter_mut() {
        record.ref_id = record.ref_id.trim().to_string();
        record.source_type = record.source_type.trim().to_string();
        record.source_locator = record.source_locator.trim().to_string();
        record.query_digest = normalize_digest_field(record, "query_digest")?;
        record.content_digest = normalize_digest_field(record, "content_digest")?;
        record.retrieved_at = normalize_retrieved_at(record)?;
    }
    records.sort_by(|left, right| {
        sort_key(left).cmp(&sort_key(right))
    });
    Ok(())
}

/// Returns the canonical sort key tuple for a record.
fn sort_key(record: &ReferenceRecord) -> (&str, &str, &str, &str) {
    (&record.ref_id, &record.source_type, &record.source_locator, &record.content_digest)
}

/// Lowercases, trims, and validates one digest field of a record.
fn normalize_digest_field(
    record: &ReferenceRecord,
    field: &'static str,
) -> Result<String, ContextError> {
    let raw = if field == "query_digest" { &record.query_digest } else { &record.content_digest };
    let value = raw.trim().to_ascii_lowercase();
    if value.is_empty() || is_digest_hex(&value) {
        Ok(value)
    } else {
        Err(ContextError::InvalidDigest {
            ref_id: record.ref_id.clone(),
            field,
            value,
        })
    }
}

/// Normalizes a record's retrieval timestamp, defaulting to the epoch.
fn normalize_retrieved_at(record: &ReferenceRecord) -> Result<String, ContextError> {
    timestamp::normalize_or_epoch(&record.retrieved_at).map_err(|_| {
        ContextError::InvalidTimestamp {
            ref_id: record.ref_id.clone(),
            value: record.retrieved_at.clone(),
        }
    })
}

/// Normalizes an envelope: records, set digest, and mode defaults.
///
/// # Errors
///
/// Returns [`ContextError`] when record normalization or digesting fails.
pub fn normalize_envelope(envelope: &mut ContextEnvelope) -> Result<(), ContextError> {
    normalize_records(&mut envelope.records)?;
    envelope.context_set_digest = context_set_digest(&envelope.records)?.as_str().to_string();
    Ok(())
}

// ============================================================================
// SECTION: Set Digest
// ============================================================================

/// Computes the order-independent context set digest for normalized records.
///
/// The digest input masks `retrieved_at` to the deterministic epoch so the
/// value witnesses content, not retrieval time.
///
/// # Errors
///
/// Returns [`ContextError::Hash`] when canonicalization fails.
pub fn context_set_digest(records: &[ReferenceRecord]) -> Result<Digest, ContextError> {
    let mut masked: Vec<ReferenceRecord> = records.to_vec();
    for record in &mut masked {
        record.retrieved_at = DETERMINISTIC_EPOCH.to_string();
    }
    masked.sort_by(|left, right| sort_key(left).cmp(&sort_key(right)));
    Ok(digest_canonical_json(&masked)?)
}

// ============================================================================
// SECTION: Build / Parse / Verify
// ============================================================================

/// Builds a normalized envelope from raw records.
///
/// # Errors
///
/// Returns [`ContextError`] when normalization or digesting fails.
pub fn build_envelope(
    records: Vec<ReferenceRecord>,
    options: &BuildEnvelopeOptions,
) -> Result<ContextEnvelope, ContextError> {
    let mut envelope = ContextEnvelope {
        header: ArtifactHeader::new(ids::CONTEXT_ENVELOPE),
        context_set_id: options.context_set_id.clone(),
        context_set_digest: String::new(),
        evidence_mode: options.evidence_mode,
        records,
    };
    normalize_envelope(&mut envelope)?;
    Ok(envelope)
}

/// Parses and normalizes an envelope from JSON bytes.
///
/// # Errors
///
/// Returns [`ContextError::PayloadTooLarge`] beyond the 1 MiB cap and
/// [`ContextError::Parse`] for malformed JSON.
pub fn parse_envelope(bytes: &[u8]) -> Result<ContextEnvelope, ContextError> {
    if bytes.len() > MAX_ENVELOPE_BYTES {
        return Err(ContextError::PayloadTooLarge {
            limit: MAX_ENVELOPE_BYTES,
            actual: bytes.len(),
        });
    }
    let mut envelope: ContextEnvelope =
        serde_json::from_slice(bytes).map_err(|err| ContextError::Parse(err.to_string()))?;
    normalize_envelope(&mut envelope)?;
    Ok(envelope)
}

/// Verifies that the stored set digest matches the normalized records.
///
/// # Errors
///
/// Returns [`ContextError::DigestMismatch`] when the stored digest differs.
pub fn verify_envelope(envelope: &ContextEnvelope) -> Result<(), ContextError> {
    let mut records = envelope.records.clone();
    normalize_records(&mut records)?;
    let computed = context_set_digest(&records)?;
    if envelope.context_set_digest == computed.as_str() {
        Ok(())
    } else {
        Err(ContextError::DigestMismatch {
            stored: envelope.context_set_digest.clone(),
            computed: computed.as_str().to_string(),
        })
    }
}
