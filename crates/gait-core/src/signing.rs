// crates/gait-core/src/signing.rs
// ============================================================================
// Module: Gait Signing
// Description: Ed25519 key lifecycle and detached signatures over digests.
// Purpose: Bind artifact digests to verifiable signer identities.
// Dependencies: base64, ed25519-dalek, rand, serde, sha2
// ============================================================================

//! ## Overview
//! Gait signs the canonical digest of an artifact, never the artifact bytes
//! themselves, so signature checks compose with digest verification. The
//! only supported algorithm is `ed25519`; `key_id` is the lowercase hex
//! SHA-256 of the 32-byte public key.
//!
//! Key material lives in process memory only. Dev mode fabricates an
//! ephemeral pair and flags the handle with a warning; prod mode requires an
//! explicit source and rejects conflicting or mismatched key material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::SECRET_KEY_LENGTH;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
pub use ed25519_dalek::VerifyingKey;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::env;
use crate::hashing::Digest;
use crate::hashing::digest_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The only signature algorithm identifier Gait accepts.
pub const SIGNATURE_ALG: &str = "ed25519";

/// Length in bytes of an Ed25519 detached signature.
pub const SIGNATURE_LENGTH: usize = 64;

// ============================================================================
// SECTION: Signature Record
// ============================================================================

/// Detached signature bound to a canonical artifact digest.
///
/// # Invariants
/// - `alg` is always `ed25519`.
/// - `sig` is standard base64 of the 64-byte signature.
/// - `signed_digest` is the lowercase hex digest the signature covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSignature {
    /// Signature algorithm identifier.
    pub alg: String,
    /// Hex SHA-256 of the signer's public key.
    pub key_id: String,
    /// Base64-encoded detached signature bytes.
    pub sig: String,
    /// Hex digest covered by the signature.
    pub signed_digest: String,
}

// ============================================================================
// SECTION: Key Pair
// ============================================================================

/// In-memory Ed25519 key pair.
///
/// # Invariants
/// - Private key bytes never leave process memory through this type.
pub struct KeyPair {
    /// Ed25519 signing key.
    signing: SigningKey,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Builds a key pair from 32 raw private-key bytes.
    #[must_use]
    pub fn from_private_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing: SigningKey::from_bytes(bytes),
        }
    }

    /// Returns the public verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Returns the key identifier for the public key.
    #[must_use]
    pub fn key_id(&self) -> String {
        key_id_for(&self.verifying_key())
    }

    /// Returns the public key as standard base64.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        Base64.encode(self.verifying_key().to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("key_id", &self.key_id()).finish_non_exhaustive()
    }
}

/// Computes the key identifier for a public key.
#[must_use]
pub fn key_id_for(verifying: &VerifyingKey) -> String {
    digest_bytes(&verifying.to_bytes()).as_str().to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by signing and verification.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Signature algorithm is not `ed25519`.
    #[error("unsupported signature algorithm: {alg}")]
    UnsupportedAlgorithm {
        /// Rejected algorithm identifier.
        alg: String,
    },
    /// Signature key identifier does not match the verifying key.
    #[error("signature key id mismatch: expected {expected}, found {actual}")]
    KeyIdMismatch {
        /// Key identifier derived from the verifying key.
        expected: String,
        /// Key identifier carried by the signature.
        actual: String,
    },
    /// Signature bytes were not valid base64.
    #[error("malformed signature base64")]
    MalformedSignature,
    /// Decoded signature had the wrong length.
    #[error("invalid signature length: expected {SIGNATURE_LENGTH} bytes, found {actual}")]
    InvalidSignatureLength {
        /// Decoded signature length in bytes.
        actual: usize,
    },
    /// Signature covers a different digest than the one being verified.
    #[error("signed digest mismatch: signature covers {signed}, verifying {verifying}")]
    SignedDigestMismatch {
        /// Digest the signature covers.
        signed: String,
        /// Digest the caller attempted to verify.
        verifying: String,
    },
    /// Cryptographic verification failed.
    #[error("signature verification failed")]
    VerificationFailed,
    /// Key material was missing or malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// Key sources were absent, conflicting, or inconsistent.
    #[error("key source error: {0}")]
    KeySource(String),
}

// ============================================================================
// SECTION: Sign / Verify
// ============================================================================

/// Signs raw bytes, returning the 64-byte detached signature.
#[must_use]
pub fn sign_bytes(pair: &KeyPair, data: &[u8]) -> Vec<u8> {
    pair.signing.sign(data).to_bytes().to_vec()
}

/// Verifies a detached signature over raw bytes.
///
/// # Errors
///
/// Returns [`SigningError::InvalidSignatureLength`] for malformed signatures
/// and [`SigningError::VerificationFailed`] when verification fails.
pub fn verify_bytes(
    verifying: &VerifyingKey,
    signature: &[u8],
    data: &[u8],
) -> Result<(), SigningError> {
    let signature = Signature::try_from(signature).map_err(|_| {
        SigningError::InvalidSignatureLength {
            actual: signature.len(),
        }
    })?;
    verifying.verify_strict(data, &signature).map_err(|_| SigningError::VerificationFailed)
}

/// Signs a canonical digest, producing a bound [`ArtifactSignature`].
#[must_use]
pub fn sign_digest_hex(pair: &KeyPair, digest: &Digest) -> ArtifactSignature {
    let signature = pair.signing.sign(digest.as_str().as_bytes());
    ArtifactSignature {
        alg: SIGNATURE_ALG.to_string(),
        key_id: pair.key_id(),
        sig: Base64.encode(signature.to_bytes()),
        signed_digest: digest.as_str().to_string(),
    }
}

/// Verifies a bound signature against a verifying key and expected digest.
///
/// # Errors
///
/// Fails explicitly on unsupported algorithm, key-id mismatch, malformed
/// base64, wrong signature length, signed-digest mismatch, or cryptographic
/// rejection.
pub fn verify_digest_hex(
    verifying: &VerifyingKey,
    signature: &ArtifactSignature,
    digest: &Digest,
) -> Result<(), SigningError> {
    if signature.alg != SIGNATURE_ALG {
        return Err(SigningError::UnsupportedAlgorithm {
            alg: signature.alg.clone(),
        });
    }
    let expected_key_id = key_id_for(verifying);
    if signature.key_id != expected_key_id {
        return Err(SigningError::KeyIdMismatch {
            expected: expected_key_id,
            actual: signature.key_id.clone(),
        });
    }
    if signature.signed_digest != digest.as_str() {
        return Err(SigningError::SignedDigestMismatch {
            signed: signature.signed_digest.clone(),
            verifying: digest.as_str().to_string(),
        });
    }
    let raw = Base64.decode(&signature.sig).map_err(|_| SigningError::MalformedSignature)?;
    verify_bytes(verifying, &raw, digest.as_str().as_bytes())
}

/// Decodes a base64 public key into a verifying key.
///
/// # Errors
///
/// Returns [`SigningError::InvalidKey`] when decoding or validation fails.
pub fn verifying_key_from_base64(encoded: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| SigningError::InvalidKey("invalid base64 public key".to_string()))?;
    verifying_key_from_bytes(&bytes)
}

/// Builds a verifying key from raw 32-byte public key material.
///
/// # Errors
///
/// Returns [`SigningError::InvalidKey`] when the bytes are not a valid key.
pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, SigningError> {
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| SigningError::InvalidKey("invalid ed25519 public key".to_string()))
}

// ============================================================================
// SECTION: Key Loading
// ============================================================================

/// Key loading mode selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Ephemeral keys are acceptable; loading never fails for lack of source.
    Dev,
    /// An explicit key source is required.
    Prod,
}

/// A loaded signing key with provenance metadata.
pub struct LoadedKey {
    /// The signing key pair.
    pub pair: KeyPair,
    /// True when the key was fabricated in dev mode.
    pub dev_mode: bool,
    /// Warning surfaced to hosts when dev mode fabricated the key.
    pub warning: Option<String>,
}

impl fmt::Debug for LoadedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedKey")
            .field("key_id", &self.pair.key_id())
            .field("dev_mode", &self.dev_mode)
            .finish_non_exhaustive()
    }
}

/// Loads the signing key from the environment or a key file.
///
/// In prod mode exactly one source must be present: the `GAIT_PRIVATE_KEY`
/// environment variable or `key_file`. When `GAIT_PUBLIC_KEY` is also set,
/// the key derived from the private material must match it.
///
/// # Errors
///
/// Returns [`SigningError::KeySource`] for absent or conflicting sources and
/// [`SigningError::InvalidKey`] for malformed key material.
pub fn load_signing_key(mode: KeyMode, key_file: Option<&Path>) -> Result<LoadedKey, SigningError> {
    let env_key = env::var(env::ENV_PRIVATE_KEY);
    let pair = match (env_key, key_file) {
        (Some(_), Some(_)) => {
            return Err(SigningError::KeySource(format!(
                "both {} and a key file were provided; use exactly one",
                env::ENV_PRIVATE_KEY
            )));
        }
        (Some(encoded), None) => Some(private_key_from_text(&encoded)?),
        (None, Some(path)) => Some(private_key_from_file(path)?),
        (None, None) => None,
    };

    let pair = match (pair, mode) {
        (Some(pair), _) => {
            check_declared_public_key(&pair)?;
            return Ok(LoadedKey {
                pair,
                dev_mode: false,
                warning: None,
            });
        }
        (None, KeyMode::Prod) => {
            return Err(SigningError::KeySource(format!(
                "prod mode requires {} or a key file",
                env::ENV_PRIVATE_KEY
            )));
        }
        (None, KeyMode::Dev) => KeyPair::generate(),
    };

    Ok(LoadedKey {
        pair,
        dev_mode: true,
        warning: Some("dev mode: using an ephemeral signing key".to_string()),
    })
}

/// Verifies the derived public key against `GAIT_PUBLIC_KEY` when declared.
fn check_declared_public_key(pair: &KeyPair) -> Result<(), SigningError> {
    let Some(declared) = env::var(env::ENV_PUBLIC_KEY) else {
        return Ok(());
    };
    let declared_key = verifying_key_from_base64(&declared)?;
    if declared_key.to_bytes() != pair.verifying_key().to_bytes() {
        return Err(SigningError::KeySource(
            "declared public key does not match the loaded private key".to_string(),
        ));
    }
    Ok(())
}

/// Parses private key text as base64 or 64-character hex.
fn private_key_from_text(text: &str) -> Result<KeyPair, SigningError> {
    let trimmed = text.trim();
    let bytes = if trimmed.len() == SECRET_KEY_LENGTH * 2 && is_hex(trimmed) {
        hex_decode(trimmed)?
    } else {
        Base64
            .decode(trimmed)
            .map_err(|_| SigningError::InvalidKey("invalid base64 private key".to_string()))?
    };
    let key_bytes: [u8; SECRET_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SigningError::InvalidKey("private key must be 32 bytes".to_string()))?;
    Ok(KeyPair::from_private_bytes(&key_bytes))
}

/// Loads private key material from a file (raw 32 bytes or encoded text).
fn private_key_from_file(path: &Path) -> Result<KeyPair, SigningError> {
    let bytes = fs::read(path)
        .map_err(|err| SigningError::KeySource(format!("unable to read key file: {err}")))?;
    if bytes.len() == SECRET_KEY_LENGTH {
        let key_bytes: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SigningError::InvalidKey("private key must be 32 bytes".to_string()))?;
        return Ok(KeyPair::from_private_bytes(&key_bytes));
    }
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| SigningError::InvalidKey("key file must be raw bytes or utf-8".to_string()))?;
    private_key_from_text(text)
}

/// Returns true when the value is entirely lowercase hex characters.
fn is_hex(value: &str) -> bool {
    value.bytes().all(|byte| byte.is_ascii_digit() || (b'a' ..= b'f').contains(&byte))
}

/// Decodes a lowercase hex string into bytes.
fn hex_decode(value: &str) -> Result<Vec<u8>, SigningError> {
    let digits = value.as_bytes();
    let mut out = Vec::with_capacity(digits.len() / 2);
    for chunk in digits.chunks_exact(2) {
        let high = hex_nibble(chunk[0])?;
        let low = hex_nibble(chunk[1])?;
        out.push((high << 4) | low);
    }
    Ok(out)
}

/// Decodes one hex digit into its nibble value.
fn hex_nibble(digit: u8) -> Result<u8, SigningError> {
    match digit {
        b'0' ..= b'9' => Ok(digit - b'0'),
        b'a' ..= b'f' => Ok(digit - b'a' + 10),
        _ => Err(SigningError::InvalidKey("invalid hex digit in key".to_string())),
    }
}
