// crates/gait-context/src/drift.rs
// ============================================================================
// Module: Context Drift Classification
// Description: Classifies drift between two captured context reference sets.
// Purpose: Distinguish harmless recaptures from semantic context changes.
// Dependencies: crate::{envelope, refs}, gait-core, serde
// ============================================================================

//! ## Overview
//! Drift classification digests two refs artifacts in two views: the full
//! normalized view and a runtime-masked view where `context_set_digest` is
//! blanked and every `retrieved_at` carries the deterministic epoch. Equal
//! full digests mean no drift; equal masked digests with differing full
//! digests mean runtime-only drift; anything else is semantic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use gait_core::hashing::Digest;
use gait_core::hashing::digest_canonical_json;
use gait_core::timestamp::DETERMINISTIC_EPOCH;

use crate::envelope::ContextError;
use crate::envelope::EvidenceMode;
use crate::envelope::ReferenceRecord;
use crate::refs::RunRefs;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Drift classification outcome.
///
/// # Invariants
/// - Variants are stable for serialization and grader matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    /// Reference sets are identical.
    None,
    /// Only retrieval-time fields changed.
    RuntimeOnly,
    /// Content or summary fields changed.
    Semantic,
}

impl DriftClass {
    /// Returns the stable wire label for the classification.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RuntimeOnly => "runtime_only",
            Self::Semantic => "semantic",
        }
    }
}

/// Drift classification report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Drift classification.
    pub classification: DriftClass,
    /// True when anything differs between the two sets.
    pub changed: bool,
    /// True when the difference is confined to runtime fields.
    pub runtime_only: bool,
}

// ============================================================================
// SECTION: Comparison Views
// ============================================================================

/// Digest-comparison view of a refs artifact, excluding the audit header.
#[derive(Serialize)]
struct RefsComparison<'a> {
    /// Normalized receipts.
    records: &'a [ReferenceRecord],
    /// Summary set digest.
    context_set_digest: &'a Option<String>,
    /// Summary evidence mode.
    context_evidence_mode: &'a Option<EvidenceMode>,
    /// Summary reference count.
    context_ref_count: &'a Option<u64>,
}

/// Summary fields compared directly between the two sets.
fn summary_fields(refs: &RunRefs) -> (Option<&str>, Option<EvidenceMode>, Option<u64>) {
    (refs.context_set_digest.as_deref(), refs.context_evidence_mode, refs.context_ref_count)
}

/// Digests the full normalized comparison view.
fn full_digest(refs: &RunRefs) -> Result<Digest, ContextError> {
    let view = RefsComparison {
        records: &refs.records,
        context_set_digest: &refs.context_set_digest,
        context_evidence_mode: &refs.context_evidence_mode,
        context_ref_count: &refs.context_ref_count,
    };
    Ok(digest_canonical_json(&view)?)
}

/// Digests the runtime-masked comparison view.
fn masked_digest(refs: &RunRefs) -> Result<Digest, ContextError> {
    let mut records = refs.records.clone();
    for record in &mut records {
        record.retrieved_at = DETERMINISTIC_EPOCH.to_string();
    }
    let blanked: Option<String> = None;
    let view = RefsComparison {
        records: &records,
        context_set_digest: &blanked,
        context_evidence_mode: &refs.context_evidence_mode,
        context_ref_count: &refs.context_ref_count,
    };
    Ok(digest_canonical_json(&view)?)
}

// ============================================================================
// SECTION: Classification Entry Point
// ============================================================================

/// Classifies drift between two refs artifacts.
///
/// Both sides are normalized before comparison, so the classification is
/// independent of record order and digest casing.
///
/// # Errors
///
/// Returns [`ContextError`] when either side fails normalization or
/// digesting.
pub fn classify_refs_drift(left: &RunRefs, right: &RunRefs) -> Result<DriftReport, ContextError> {
    let mut left = left.clone();
    let mut right = right.clone();
    left.normalize()?;
    right.normalize()?;

    let full_equal = full_digest(&left)? == full_digest(&right)?;
    if full_equal {
        return Ok(DriftReport {
            classification: DriftClass::None,
            changed: false,
            runtime_only: false,
        });
    }

    let masked_equal = masked_digest(&left)? == masked_digest(&right)?;
    let summary_equal = summary_fields(&left) == summary_fields(&right);
    if masked_equal && summary_equal {
        return Ok(DriftReport {
            classification: DriftClass::RuntimeOnly,
            changed: true,
            runtime_only: true,
        });
    }

    Ok(DriftReport {
        classification: DriftClass::Semantic,
        changed: true,
        runtime_only: false,
    })
}
