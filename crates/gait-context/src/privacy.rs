// crates/gait-context/src/privacy.rs
// ============================================================================
// Module: Context Privacy Transforms
// Description: Redaction transforms over context envelopes.
// Purpose: Share context evidence without leaking locators or content hints.
// Dependencies: crate::envelope, gait-core
// ============================================================================

//! ## Overview
//! Three transforms, ordered by how much they remove: `raw` is identity,
//! `hashes` redacts locators and retrieval parameters while preserving
//! digests, and `metadata` additionally zeroes digests so only the shape of
//! the context set remains. The set digest is recomputed after `metadata`
//! because zeroing record digests changes the canonical records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use gait_core::hashing::Digest;

use crate::envelope::ContextEnvelope;
use crate::envelope::ContextError;
use crate::envelope::RedactionMode;
use crate::envelope::context_set_digest;
use crate::envelope::normalize_records;

// ============================================================================
// SECTION: Locator Placeholders
// ============================================================================

/// Locator placeholder for the `hashes` transform.
const REDACTED_HASHES_LOCATOR: &str = "redacted:hashes";

/// Locator placeholder for the `metadata` transform.
const REDACTED_METADATA_LOCATOR: &str = "redacted:metadata";

// ============================================================================
// SECTION: Transform
// ============================================================================

/// Applies a privacy transform, returning the redacted envelope.
///
/// `raw` returns the input unchanged. `hashes` preserves per-record digests.
/// `metadata` zeroes digests and recomputes `context_set_digest` over the
/// transformed records.
///
/// # Errors
///
/// Returns [`ContextError`] when normalization or digesting fails.
pub fn transform_envelope_privacy(
    envelope: &ContextEnvelope,
    mode: RedactionMode,
) -> Result<ContextEnvelope, ContextError> {
    let mut out = envelope.clone();
    match mode {
        RedactionMode::Raw => return Ok(out),
        RedactionMode::Hashes => {
            for record in &mut out.records {
                record.source_locator = REDACTED_HASHES_LOCATOR.to_string();
                record.retrieval_params = None;
                record.redaction_mode = RedactionMode::Hashes;
            }
        }
        RedactionMode::Metadata => {
            for record in &mut out.records {
                record.source_locator = REDACTED_METADATA_LOCATOR.to_string();
                record.query_digest = Digest::zero().as_str().to_string();
                record.content_digest = Digest::zero().as_str().to_string();
                record.sensitivity_label = None;
                record.retrieval_params = None;
                record.redaction_mode = RedactionMode::Metadata;
            }
        }
    }
    normalize_records(&mut out.records)?;
    out.context_set_digest = context_set_digest(&out.records)?.as_str().to_string();
    Ok(out)
}
