// crates/gait-core/tests/contracts.rs
// ============================================================================
// Module: Contract Tests
// Description: Verifies schema registry, timestamps, and error envelopes.
// ============================================================================
//! ## Overview
//! Checks that every embedded schema compiles, that timestamp normalization
//! is epoch-deterministic, and that classified errors render stable
//! envelopes and exit codes.

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

use gait_core::error::ClassifiedError;
use gait_core::error::ErrorCategory;
use gait_core::schema;
use gait_core::schema::ids;
use gait_core::timestamp::DETERMINISTIC_EPOCH;
use gait_core::timestamp::age_seconds;
use gait_core::timestamp::normalize_or_epoch;
use gait_core::timestamp::normalize_rfc3339;
use serde_json::json;

// ============================================================================
// SECTION: Schema Registry
// ============================================================================

#[test]
fn every_registered_schema_parses() {
    let all = [
        ids::RUNPACK_MANIFEST,
        ids::RUNPACK_RUN,
        ids::RUNPACK_REFS,
        ids::RUNPACK_INTENT,
        ids::RUNPACK_RESULT,
        ids::RUNPACK_SESSION_EVENT,
        ids::RUNPACK_SESSION_CHECKPOINT,
        ids::GATE_POLICY,
        ids::GATE_INTENT_REQUEST,
        ids::GATE_RESULT,
        ids::GATE_TRACE_RECORD,
        ids::GATE_APPROVAL_AUDIT,
        ids::GATE_DELEGATION_AUDIT,
        ids::CONTEXT_ENVELOPE,
        ids::CONTEXT_REFERENCE_RECORD,
        ids::CONTEXT_BUDGET_REPORT,
        ids::GUARD_PACK_MANIFEST,
        ids::REGRESS_RESULT,
        ids::SCOUT_INVENTORY_SNAPSHOT,
    ];
    for schema_id in all {
        schema::schema_document(schema_id).expect("schema parses");
    }
}

#[test]
fn unknown_schema_id_is_rejected() {
    assert!(schema::schema_document("runpack/unknown").is_err());
}

#[test]
fn intent_request_schema_validates_minimal_intent() {
    let value = json!({"tool_name": "tool.write"});
    schema::validate_value(ids::GATE_INTENT_REQUEST, &value).expect("minimal intent validates");
}

#[test]
fn intent_request_schema_rejects_missing_tool_name() {
    let value = json!({"args": {}});
    assert!(schema::validate_value(ids::GATE_INTENT_REQUEST, &value).is_err());
}

#[test]
fn readers_tolerate_unknown_optional_fields() {
    let value = json!({
        "tool_name": "tool.write",
        "future_field": {"nested": true}
    });
    schema::validate_value(ids::GATE_INTENT_REQUEST, &value)
        .expect("unknown optional fields are tolerated within a major version");
}

// ============================================================================
// SECTION: Timestamps
// ============================================================================

#[test]
fn normalize_forces_utc() {
    let normalized = normalize_rfc3339("2026-01-02T03:04:05+02:00").expect("normalize");
    assert_eq!(normalized, "2026-01-02T01:04:05Z");
}

#[test]
fn empty_timestamp_defaults_to_epoch() {
    assert_eq!(normalize_or_epoch("").expect("epoch"), DETERMINISTIC_EPOCH);
    assert_eq!(normalize_or_epoch("   ").expect("epoch"), DETERMINISTIC_EPOCH);
}

#[test]
fn age_is_signed_seconds() {
    let age =
        age_seconds("2026-01-01T00:00:00Z", "2026-01-01T00:05:00Z").expect("age");
    assert_eq!(age, 300);
    let negative =
        age_seconds("2026-01-01T00:05:00Z", "2026-01-01T00:00:00Z").expect("age");
    assert_eq!(negative, -300);
}

// ============================================================================
// SECTION: Error Envelope
// ============================================================================

#[test]
fn envelope_carries_classification() {
    let err = ClassifiedError::new(
        ErrorCategory::VerificationFailed,
        "manifest_digest_mismatch",
        "manifest digest does not match archive contents",
    )
    .with_hint("re-export the runpack from the original journal");
    let envelope = err.envelope();
    assert!(!envelope.ok);
    assert_eq!(envelope.error_code, "manifest_digest_mismatch");
    assert_eq!(envelope.error_category, ErrorCategory::VerificationFailed);
    assert!(!envelope.retryable);
    assert!(envelope.hint.is_some());
}

#[test]
fn exit_codes_follow_the_contract() {
    assert_eq!(ErrorCategory::InvalidInput.exit_code(), 6);
    assert_eq!(ErrorCategory::VerificationFailed.exit_code(), 2);
    assert_eq!(ErrorCategory::PolicyBlocked.exit_code(), 3);
    assert_eq!(ErrorCategory::ApprovalRequired.exit_code(), 4);
    assert_eq!(ErrorCategory::IoFailure.exit_code(), 1);
    assert_eq!(ErrorCategory::StateContention.exit_code(), 2);
}

#[test]
fn state_contention_is_retryable_by_default() {
    let err = ClassifiedError::new(
        ErrorCategory::StateContention,
        "session_lock_contention",
        "lock budget exhausted",
    );
    assert!(err.retryable);
    let io = ClassifiedError::new(ErrorCategory::IoFailure, "read_failed", "cannot read");
    assert!(!io.retryable);
}
