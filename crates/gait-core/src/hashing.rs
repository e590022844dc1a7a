// crates/gait-core/src/hashing.rs
// ============================================================================
// Module: Gait Canonical Hashing
// Description: RFC 8785 JSON canonicalization and SHA-256 content digesting.
// Purpose: Provide deterministic digests for every Gait artifact contract.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Gait digests all canonical JSON using RFC 8785 (JCS) so equal values hash
//! equally regardless of key order or numeric spelling. Binary payloads are
//! hashed directly over raw bytes. Digests are 64-character lowercase hex
//! SHA-256 values; the zero digest (64 zero characters) marks absent content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest as Sha2Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Length of the short digest prefix used in derived identifiers.
pub const DIGEST_SHORT_LEN: usize = 16;

/// Lowercase hex alphabet used for digest encoding.
const HEX_ALPHABET: &[u8; 16] = b"0123456789abcdef";

// ============================================================================
// SECTION: Digest
// ============================================================================

/// Deterministic SHA-256 content digest in lowercase hex form.
///
/// # Invariants
/// - The wire form is always exactly 64 lowercase hex characters.
/// - A digest of 64 zero characters denotes absent content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Creates a digest from raw SHA-256 output bytes.
    #[must_use]
    fn from_raw(bytes: &[u8]) -> Self {
        Self(hex_encode(bytes))
    }

    /// Returns the zero digest denoting absent content.
    #[must_use]
    pub fn zero() -> Self {
        Self("0".repeat(DIGEST_HEX_LEN))
    }

    /// Parses and validates a 64-character lowercase hex digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::InvalidDigest`] when the value is not 64
    /// lowercase hex characters.
    pub fn parse(value: &str) -> Result<Self, HashError> {
        if is_digest_hex(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(HashError::InvalidDigest {
                value: value.to_string(),
            })
        }
    }

    /// Returns the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when this is the zero digest.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|byte| byte == b'0')
    }

    /// Returns the first sixteen hex characters for derived identifiers.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[.. DIGEST_SHORT_LEN]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing or validating canonical digests.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
    /// Canonical payload exceeded the configured size limit.
    #[error("canonical payload of {actual} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Configured size limit in bytes.
        limit: usize,
        /// Actual canonical payload size in bytes.
        actual: usize,
    },
    /// Digest value was not 64 lowercase hex characters.
    #[error("invalid digest hex: {value}")]
    InvalidDigest {
        /// Rejected digest value.
        value: String,
    },
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Returns canonical JSON bytes, rejecting payloads beyond `limit` bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails and
/// [`HashError::SizeLimitExceeded`] when the canonical form is too large.
pub fn canonical_json_bytes_with_limit<T: Serialize + ?Sized>(
    value: &T,
    limit: usize,
) -> Result<Vec<u8>, HashError> {
    let bytes = canonical_json_bytes(value)?;
    if bytes.len() > limit {
        return Err(HashError::SizeLimitExceeded {
            limit,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest::from_raw(&hasher.finalize())
}

/// Hashes the canonical JSON form of a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn digest_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Digest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(digest_bytes(&bytes))
}

/// Returns true when the value is exactly 64 lowercase hex characters.
#[must_use]
pub fn is_digest_hex(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN
        && value.bytes().all(|byte| byte.is_ascii_digit() || (b'a' ..= b'f').contains(&byte))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_ALPHABET[(byte >> 4) as usize] as char);
        out.push(HEX_ALPHABET[(byte & 0x0f) as usize] as char);
    }
    out
}
