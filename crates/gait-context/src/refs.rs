// crates/gait-context/src/refs.rs
// ============================================================================
// Module: Run Context References
// Description: The refs.json model bridging envelopes into runpacks.
// Purpose: Carry context receipts and summary digests alongside a run.
// Dependencies: crate::envelope, gait-core, serde
// ============================================================================

//! ## Overview
//! `refs.json` is the runpack-side view of context evidence: the reference
//! records (receipts) plus the summary fields gates and graders match on
//! (`context_set_digest`, `context_evidence_mode`, `context_ref_count`).
//! Applying an envelope to refs establishes digest continuity; the reverse
//! reconstructs an envelope for verification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;

use crate::envelope::BuildEnvelopeOptions;
use crate::envelope::ContextEnvelope;
use crate::envelope::ContextError;
use crate::envelope::EvidenceMode;
use crate::envelope::ReferenceRecord;
use crate::envelope::build_envelope;
use crate::envelope::normalize_records;

// ============================================================================
// SECTION: Run Refs
// ============================================================================

/// Context receipts and summary fields carried inside a runpack.
///
/// # Invariants
/// - When `context_evidence_mode` is `required`, `context_set_digest` must
///   be present and non-empty (enforced at runpack write and read).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRefs {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Context reference receipts.
    #[serde(default)]
    pub records: Vec<ReferenceRecord>,
    /// Summary digest over the normalized records.
    #[serde(default)]
    pub context_set_digest: Option<String>,
    /// Evidence collection mode for the run.
    #[serde(default)]
    pub context_evidence_mode: Option<EvidenceMode>,
    /// Count of context references in the set.
    #[serde(default)]
    pub context_ref_count: Option<u64>,
}

impl RunRefs {
    /// Creates an empty refs artifact with no context evidence.
    ///
    /// The header carries the deterministic epoch so refs participate in
    /// manifest digests without wall-clock noise.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            header: ArtifactHeader::deterministic(ids::RUNPACK_REFS),
            records: Vec::new(),
            context_set_digest: None,
            context_evidence_mode: None,
            context_ref_count: None,
        }
    }

    /// Normalizes receipts and summary fields in place.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when a receipt fails normalization.
    pub fn normalize(&mut self) -> Result<(), ContextError> {
        normalize_records(&mut self.records)?;
        if let Some(digest) = &self.context_set_digest {
            let trimmed = digest.trim().to_ascii_lowercase();
            self.context_set_digest = if trimmed.is_empty() { None } else { Some(trimmed) };
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Envelope Continuity
// ============================================================================

/// Applies an envelope's records and summary onto a refs artifact.
pub fn apply_envelope_to_refs(refs: &mut RunRefs, envelope: &ContextEnvelope) {
    refs.records = envelope.records.clone();
    refs.context_set_digest = Some(envelope.context_set_digest.clone());
    refs.context_evidence_mode = Some(envelope.evidence_mode);
    refs.context_ref_count = Some(envelope.records.len() as u64);
}

/// Reconstructs an envelope from a refs artifact.
///
/// Returns `Ok(None)` when the refs carry no context evidence at all.
///
/// # Errors
///
/// Returns [`ContextError`] when receipts fail normalization or digesting.
pub fn envelope_from_refs(refs: &RunRefs) -> Result<Option<ContextEnvelope>, ContextError> {
    if refs.records.is_empty() && refs.context_set_digest.is_none() {
        return Ok(None);
    }
    let envelope = build_envelope(
        refs.records.clone(),
        &BuildEnvelopeOptions {
            context_set_id: refs
                .context_set_digest
                .clone()
                .unwrap_or_else(|| "ctx_from_refs".to_string()),
            evidence_mode: refs.context_evidence_mode.unwrap_or_default(),
        },
    )?;
    Ok(Some(envelope))
}
