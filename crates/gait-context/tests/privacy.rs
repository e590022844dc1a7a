// crates/gait-context/tests/privacy.rs
// ============================================================================
// Module: Privacy Transform Tests
// Description: Verifies raw, hashes, and metadata redaction laws.
// ============================================================================
//! ## Overview
//! `raw` is identity; `hashes` preserves per-record digests while redacting
//! locators; `metadata` zeroes digests and recomputes the set digest.

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
use gait_context::ContextEnvelope;
use gait_context::EvidenceMode;
use gait_context::RedactionMode;
use gait_context::ReferenceRecord;
use gait_context::build_envelope;
use gait_context::transform_envelope_privacy;
use gait_context::verify_envelope;
use gait_core::hashing::digest_bytes;

/// Builds an envelope with retrieval parameters and sensitivity labels set.
fn sample_envelope() -> ContextEnvelope {
    let record = ReferenceRecord {
        ref_id: "ref_a".to_string(),
        source_type: "http".to_string(),
        source_locator: "https://internal.example/docs/spec".to_string(),
        query_digest: digest_bytes(b"query").as_str().to_string(),
        content_digest: digest_bytes(b"content").as_str().to_string(),
        retrieved_at: "2026-03-01T12:00:00Z".to_string(),
        redaction_mode: RedactionMode::Raw,
        immutability: gait_context::Immutability::Mutable,
        freshness_sla_seconds: Some(3600),
        sensitivity_label: Some("internal".to_string()),
        retrieval_params: Some(serde_json::json!({"q": "spec"})),
    };
    build_envelope(
        vec![record],
        &BuildEnvelopeOptions {
            context_set_id: "ctx_privacy".to_string(),
            evidence_mode: EvidenceMode::Required,
        },
    )
    .expect("build")
}

#[test]
fn raw_mode_is_identity() {
    let envelope = sample_envelope();
    let out = transform_envelope_privacy(&envelope, RedactionMode::Raw).expect("transform");
    assert_eq!(out, envelope);
}

#[test]
fn hashes_mode_redacts_locator_but_keeps_digests() {
    let envelope = sample_envelope();
    let out = transform_envelope_privacy(&envelope, RedactionMode::Hashes).expect("transform");

    let record = &out.records[0];
    assert_eq!(record.source_locator, "redacted:hashes");
    assert!(record.retrieval_params.is_none());
    assert_eq!(record.content_digest, envelope.records[0].content_digest);
    assert_eq!(record.query_digest, envelope.records[0].query_digest);
    assert_eq!(record.redaction_mode, RedactionMode::Hashes);
}

#[test]
fn metadata_mode_zeroes_digests_and_recomputes_set_digest() {
    let envelope = sample_envelope();
    let out = transform_envelope_privacy(&envelope, RedactionMode::Metadata).expect("transform");

    let record = &out.records[0];
    assert_eq!(record.source_locator, "redacted:metadata");
    assert!(record.content_digest.bytes().all(|byte| byte == b'0'));
    assert!(record.query_digest.bytes().all(|byte| byte == b'0'));
    assert!(record.sensitivity_label.is_none());
    assert!(record.retrieval_params.is_none());
    assert_ne!(out.context_set_digest, envelope.context_set_digest);
}

#[test]
fn transformed_envelopes_still_verify() {
    let envelope = sample_envelope();
    for mode in [RedactionMode::Raw, RedactionMode::Hashes, RedactionMode::Metadata] {
        let out = transform_envelope_privacy(&envelope, mode).expect("transform");
        verify_envelope(&out).expect("transformed envelope must verify");
    }
}
