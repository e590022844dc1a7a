// crates/gait-core/tests/signing.rs
// ============================================================================
// Module: Signing Tests
// Description: Verifies Ed25519 signature binding and explicit failure modes.
// ============================================================================
//! ## Overview
//! Covers sign/verify round trips, tamper rejection, and each explicit
//! verification failure: unsupported algorithm, key-id mismatch, malformed
//! base64, wrong signature length, and signed-digest mismatch.

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

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use gait_core::hashing::digest_bytes;
use gait_core::signing::KeyPair;
use gait_core::signing::SIGNATURE_ALG;
use gait_core::signing::SigningError;
use gait_core::signing::key_id_for;
use gait_core::signing::sign_bytes;
use gait_core::signing::sign_digest_hex;
use gait_core::signing::verify_bytes;
use gait_core::signing::verify_digest_hex;

#[test]
fn sign_verify_round_trip_over_bytes() {
    let pair = KeyPair::generate();
    let data = b"artifact bytes";
    let signature = sign_bytes(&pair, data);
    assert!(verify_bytes(&pair.verifying_key(), &signature, data).is_ok());
}

#[test]
fn verify_rejects_mutated_payload() {
    let pair = KeyPair::generate();
    let signature = sign_bytes(&pair, b"original");
    let err = verify_bytes(&pair.verifying_key(), &signature, b"mutated").unwrap_err();
    assert!(matches!(err, SigningError::VerificationFailed));
}

#[test]
fn digest_signature_round_trip() {
    let pair = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let signature = sign_digest_hex(&pair, &digest);
    assert_eq!(signature.alg, SIGNATURE_ALG);
    assert_eq!(signature.key_id, pair.key_id());
    assert_eq!(signature.signed_digest, digest.as_str());
    assert!(verify_digest_hex(&pair.verifying_key(), &signature, &digest).is_ok());
}

#[test]
fn verify_rejects_unsupported_algorithm() {
    let pair = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let mut signature = sign_digest_hex(&pair, &digest);
    signature.alg = "rsa".to_string();
    let err = verify_digest_hex(&pair.verifying_key(), &signature, &digest).unwrap_err();
    assert!(matches!(err, SigningError::UnsupportedAlgorithm { .. }));
}

#[test]
fn verify_rejects_key_id_mismatch() {
    let pair = KeyPair::generate();
    let other = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let signature = sign_digest_hex(&pair, &digest);
    let err = verify_digest_hex(&other.verifying_key(), &signature, &digest).unwrap_err();
    assert!(matches!(err, SigningError::KeyIdMismatch { .. }));
}

#[test]
fn verify_rejects_malformed_base64() {
    let pair = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let mut signature = sign_digest_hex(&pair, &digest);
    signature.sig = "not base64 !!!".to_string();
    let err = verify_digest_hex(&pair.verifying_key(), &signature, &digest).unwrap_err();
    assert!(matches!(err, SigningError::MalformedSignature));
}

#[test]
fn verify_rejects_wrong_signature_length() {
    let pair = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let mut signature = sign_digest_hex(&pair, &digest);
    signature.sig = Base64.encode([0u8; 12]);
    let err = verify_digest_hex(&pair.verifying_key(), &signature, &digest).unwrap_err();
    assert!(matches!(
        err,
        SigningError::InvalidSignatureLength {
            actual: 12
        }
    ));
}

#[test]
fn verify_rejects_signed_digest_mismatch() {
    let pair = KeyPair::generate();
    let digest = digest_bytes(b"payload");
    let other_digest = digest_bytes(b"different payload");
    let signature = sign_digest_hex(&pair, &digest);
    let err = verify_digest_hex(&pair.verifying_key(), &signature, &other_digest).unwrap_err();
    assert!(matches!(err, SigningError::SignedDigestMismatch { .. }));
}

#[test]
fn key_id_is_hex_sha256_of_public_key() {
    let pair = KeyPair::generate();
    let expected = digest_bytes(&pair.verifying_key().to_bytes());
    assert_eq!(pair.key_id(), expected.as_str());
    assert_eq!(key_id_for(&pair.verifying_key()), expected.as_str());
}

#[test]
fn distinct_keys_have_distinct_ids() {
    let first = KeyPair::generate();
    let second = KeyPair::generate();
    assert_ne!(first.key_id(), second.key_id());
}

// ============================================================================
// SECTION: Key Loading
// ============================================================================

#[test]
fn prod_mode_loads_key_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let private_bytes = [7u8; 32];
    let reference = KeyPair::from_private_bytes(&private_bytes);
    let key_path = dir.path().join("signing.key");
    std::fs::write(&key_path, private_bytes).expect("write key");

    let loaded = gait_core::signing::load_signing_key(
        gait_core::signing::KeyMode::Prod,
        Some(&key_path),
    )
    .expect("load");
    assert!(!loaded.dev_mode);
    assert!(loaded.warning.is_none());
    assert_eq!(loaded.pair.key_id(), reference.key_id());
}

#[test]
fn prod_mode_file_key_is_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_path = dir.path().join("signing.key");
    std::fs::write(&key_path, vec![7u8; 32]).expect("write key");

    let first = gait_core::signing::load_signing_key(
        gait_core::signing::KeyMode::Prod,
        Some(&key_path),
    )
    .expect("first load");
    let second = gait_core::signing::load_signing_key(
        gait_core::signing::KeyMode::Prod,
        Some(&key_path),
    )
    .expect("second load");
    assert_eq!(first.pair.key_id(), second.pair.key_id());
}

#[test]
fn prod_mode_rejects_malformed_key_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_path = dir.path().join("signing.key");
    std::fs::write(&key_path, b"definitely not key material of the right shape").expect("write");

    let err = gait_core::signing::load_signing_key(
        gait_core::signing::KeyMode::Prod,
        Some(&key_path),
    )
    .unwrap_err();
    assert!(matches!(err, SigningError::InvalidKey(_)));
}
