// crates/gait-context/tests/envelope.rs
// ============================================================================
// Module: Context Envelope Tests
// Description: Verifies envelope normalization, digests, and parse limits.
// ============================================================================
//! ## Overview
//! The set digest must be order independent and runtime invariant; parsing
//! must enforce the payload cap; verification must detect stale digests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use gait_context::BuildEnvelopeOptions;
use gait_context::ContextError;
use gait_context::EvidenceMode;
use gait_context::Immutability;
use gait_context::RedactionMode;
use gait_context::ReferenceRecord;
use gait_context::build_envelope;
use gait_context::context_set_digest;
use gait_context::parse_envelope;
use gait_context::verify_envelope;
use gait_core::hashing::digest_bytes;
use proptest::prelude::*;

/// Builds a reference record for tests.
fn record(ref_id: &str, locator: &str, content: &[u8]) -> ReferenceRecord {
    ReferenceRecord {
        ref_id: ref_id.to_string(),
        source_type: "file".to_string(),
        source_locator: locator.to_string(),
        query_digest: String::new(),
        content_digest: digest_bytes(content).as_str().to_string(),
        retrieved_at: "2026-03-01T12:00:00Z".to_string(),
        redaction_mode: RedactionMode::Raw,
        immutability: Immutability::Unknown,
        freshness_sla_seconds: None,
        sensitivity_label: None,
        retrieval_params: None,
    }
}

/// Default build options for tests.
fn options() -> BuildEnvelopeOptions {
    BuildEnvelopeOptions {
        context_set_id: "ctx_test".to_string(),
        evidence_mode: EvidenceMode::BestEffort,
    }
}

#[test]
fn set_digest_is_order_independent() {
    let a = record("ref_a", "src/a.rs", b"alpha");
    let b = record("ref_b", "src/b.rs", b"beta");

    let forward = context_set_digest(&[a.clone(), b.clone()]).expect("forward");
    let reversed = context_set_digest(&[b, a]).expect("reversed");
    assert_eq!(forward, reversed);
}

#[test]
fn set_digest_ignores_retrieval_time() {
    let mut early = record("ref_a", "src/a.rs", b"alpha");
    let mut late = early.clone();
    early.retrieved_at = "2026-03-01T12:00:00Z".to_string();
    late.retrieved_at = "2026-03-01T12:05:00Z".to_string();

    let first = context_set_digest(&[early]).expect("early digest");
    let second = context_set_digest(&[late]).expect("late digest");
    assert_eq!(first, second, "retrieval time must not move the set digest");
}

#[test]
fn set_digest_changes_with_content() {
    let original = record("ref_a", "src/a.rs", b"alpha");
    let mutated = record("ref_a", "src/a.rs", b"alpha-changed");

    let first = context_set_digest(&[original]).expect("digest");
    let second = context_set_digest(&[mutated]).expect("digest");
    assert_ne!(first, second);
}

#[test]
fn build_normalizes_digest_case_and_timestamps() {
    let mut raw = record("ref_a", "src/a.rs", b"alpha");
    raw.content_digest = raw.content_digest.to_ascii_uppercase();
    raw.retrieved_at = String::new();

    let envelope = build_envelope(vec![raw], &options()).expect("build");
    let normalized = &envelope.records[0];
    assert!(normalized.content_digest.bytes().all(|byte| !byte.is_ascii_uppercase()));
    assert_eq!(normalized.retrieved_at, "1980-01-01T00:00:00Z");
}

#[test]
fn build_rejects_invalid_digest_hex() {
    let mut raw = record("ref_a", "src/a.rs", b"alpha");
    raw.content_digest = "zz".repeat(32);
    let err = build_envelope(vec![raw], &options()).unwrap_err();
    assert!(matches!(err, ContextError::InvalidDigest { .. }));
}

#[test]
fn verify_detects_stale_set_digest() {
    let mut envelope =
        build_envelope(vec![record("ref_a", "src/a.rs", b"alpha")], &options()).expect("build");
    assert!(verify_envelope(&envelope).is_ok());

    envelope.records[0].content_digest = digest_bytes(b"tampered").as_str().to_string();
    let err = verify_envelope(&envelope).unwrap_err();
    assert!(matches!(err, ContextError::DigestMismatch { .. }));
}

#[test]
fn parse_round_trips_built_envelopes() {
    let envelope =
        build_envelope(vec![record("ref_a", "src/a.rs", b"alpha")], &options()).expect("build");
    let bytes = serde_json::to_vec(&envelope).expect("serialize");
    let parsed = parse_envelope(&bytes).expect("parse");
    assert_eq!(parsed.context_set_digest, envelope.context_set_digest);
    assert_eq!(parsed.records, envelope.records);
}

#[test]
fn parse_enforces_payload_cap() {
    let oversized = vec![b'x'; gait_context::MAX_ENVELOPE_BYTES + 1];
    let err = parse_envelope(&oversized).unwrap_err();
    assert!(matches!(err, ContextError::PayloadTooLarge { .. }));
}

#[test]
fn evidence_mode_defaults_to_best_effort() {
    let bytes = br#"{
        "context_set_id": "ctx_min",
        "context_set_digest": "",
        "records": []
    }"#;
    let envelope = parse_envelope(bytes).expect("parse minimal");
    assert_eq!(envelope.evidence_mode, EvidenceMode::BestEffort);
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn set_digest_is_permutation_invariant(seed in 0u64 .. 1000) {
        let records: Vec<ReferenceRecord> = (0 .. 5)
            .map(|index| {
                record(
                    &format!("ref_{index}"),
                    &format!("src/{index}.rs"),
                    format!("content-{seed}-{index}").as_bytes(),
                )
            })
            .collect();
        let mut rotated = records.clone();
        rotated.rotate_left((seed as usize) % records.len().max(1));

        let base = context_set_digest(&records).expect("base digest");
        let permuted = context_set_digest(&rotated).expect("permuted digest");
        prop_assert_eq!(base, permuted);
    }
}
