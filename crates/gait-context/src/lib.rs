// crates/gait-context/src/lib.rs
// ============================================================================
// Module: Gait Context Library
// Description: Context evidence envelopes, drift classification, and privacy.
// Purpose: Prove which context an agent run consumed, deterministically.
// Dependencies: crate::{drift, envelope, privacy, refs}
// ============================================================================

//! ## Overview
//! Context-proof turns retrieved context references into deterministic
//! evidence: envelopes with order-independent set digests, digest continuity
//! into runpacks via `refs.json`, drift classification between captures
//! (none / runtime-only / semantic), and privacy transforms that redact
//! records without breaking verification.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod drift;
pub mod envelope;
pub mod privacy;
pub mod refs;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use drift::DriftClass;
pub use drift::DriftReport;
pub use drift::classify_refs_drift;
pub use envelope::BuildEnvelopeOptions;
pub use envelope::ContextEnvelope;
pub use envelope::ContextError;
pub use envelope::EvidenceMode;
pub use envelope::Immutability;
pub use envelope::MAX_ENVELOPE_BYTES;
pub use envelope::RedactionMode;
pub use envelope::ReferenceRecord;
pub use envelope::build_envelope;
pub use envelope::context_set_digest;
pub use envelope::normalize_envelope;
pub use envelope::normalize_records;
pub use envelope::parse_envelope;
pub use envelope::verify_envelope;
pub use privacy::transform_envelope_privacy;
pub use refs::RunRefs;
pub use refs::apply_envelope_to_refs;
pub use refs::envelope_from_refs;
