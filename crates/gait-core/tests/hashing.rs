// crates/gait-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Verifies RFC 8785 canonical JSON digesting behavior.
// ============================================================================
//! ## Overview
//! Ensures canonical digests are deterministic across key ordering and
//! numeric spelling, that digest hex validation holds, and that golden
//! SHA-256 vectors match.

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

use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::canonical_json_bytes;
use gait_core::hashing::canonical_json_bytes_with_limit;
use gait_core::hashing::digest_bytes;
use gait_core::hashing::digest_canonical_json;
use gait_core::hashing::is_digest_hex;
use proptest::prelude::*;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

#[test]
fn canonical_digest_is_order_independent_for_maps() {
    let mut map_a = Map::new();
    map_a.insert("b".to_string(), json!(2));
    map_a.insert("a".to_string(), json!(1));

    let mut map_b = Map::new();
    map_b.insert("a".to_string(), json!(1));
    map_b.insert("b".to_string(), json!(2));

    let digest_a = digest_canonical_json(&Value::Object(map_a)).expect("digest a");
    let digest_b = digest_canonical_json(&Value::Object(map_b)).expect("digest b");

    assert_eq!(digest_a, digest_b);
}

#[test]
fn canonical_digest_normalizes_numeric_representation() {
    let digest_a = digest_canonical_json(&json!(1.0)).expect("digest a");
    let digest_b = digest_canonical_json(&json!(1)).expect("digest b");
    assert_eq!(digest_a, digest_b);
}

#[test]
fn canonical_bytes_respect_size_limit() {
    let payload = json!({"data": "x".repeat(64)});
    let err = canonical_json_bytes_with_limit(&payload, 16).unwrap_err();
    assert!(matches!(err, HashError::SizeLimitExceeded { .. }));
}

#[test]
fn canonical_bytes_exact_boundary_passes() {
    let payload = json!({"d": "x"});
    let bytes = canonical_json_bytes(&payload).expect("canonical bytes");
    let result = canonical_json_bytes_with_limit(&payload, bytes.len());
    assert!(result.is_ok(), "Exact boundary should succeed");
}

// ============================================================================
// SECTION: Golden SHA-256 Tests (Known-Value Verification)
// ============================================================================

#[test]
fn golden_digest_empty_object() {
    // SHA-256 of "{}" = 44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a
    let digest = digest_canonical_json(&json!({})).expect("digest");
    assert_eq!(
        digest.as_str(),
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}

#[test]
fn golden_digest_empty_array() {
    // SHA-256 of "[]" = 4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945
    let digest = digest_canonical_json(&json!([])).expect("digest");
    assert_eq!(
        digest.as_str(),
        "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
    );
}

#[test]
fn golden_digest_bytes_direct() {
    // SHA-256 of "test" = 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
    let digest = digest_bytes(b"test");
    assert_eq!(
        digest.as_str(),
        "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
    );
}

#[test]
fn golden_digest_empty_bytes() {
    // SHA-256 of empty input = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
    let digest = digest_bytes(b"");
    assert_eq!(
        digest.as_str(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

// ============================================================================
// SECTION: Digest Form
// ============================================================================

#[test]
fn zero_digest_is_sixty_four_zeros() {
    let zero = Digest::zero();
    assert_eq!(zero.as_str().len(), 64);
    assert!(zero.is_zero());
    assert!(zero.as_str().bytes().all(|byte| byte == b'0'));
}

#[test]
fn digest_parse_rejects_uppercase() {
    let err = Digest::parse("ABC").unwrap_err();
    assert!(matches!(err, HashError::InvalidDigest { .. }));
    let upper = "A".repeat(64);
    assert!(Digest::parse(&upper).is_err());
}

#[test]
fn digest_parse_accepts_computed_values() {
    let digest = digest_bytes(b"payload");
    let reparsed = Digest::parse(digest.as_str()).expect("reparse");
    assert_eq!(digest, reparsed);
}

#[test]
fn digest_short_is_first_sixteen_chars() {
    let digest = digest_bytes(b"payload");
    assert_eq!(digest.short(), &digest.as_str()[.. 16]);
}

#[test]
fn is_digest_hex_matches_expected_grammar() {
    assert!(is_digest_hex(&"a".repeat(64)));
    assert!(!is_digest_hex(&"a".repeat(63)));
    assert!(!is_digest_hex(&"G".repeat(64)));
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn digest_is_deterministic_for_equal_inputs(data in prop::collection::vec(any::<u8>(), 0 .. 512)) {
        prop_assert_eq!(digest_bytes(&data), digest_bytes(&data));
    }

    #[test]
    fn digest_hex_is_always_lowercase(data in prop::collection::vec(any::<u8>(), 0 .. 128)) {
        let digest = digest_bytes(&data);
        prop_assert!(is_digest_hex(digest.as_str()));
    }
}
