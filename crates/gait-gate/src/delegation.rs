// crates/gait-gate/src/delegation.rs
// ============================================================================
// Module: Delegation Verification
// Description: Signed delegation chains and their verification rules.
// Purpose: Prove an agent acts within an explicitly granted authority chain.
// Dependencies: gait-core, serde
// ============================================================================

//! ## Overview
//! A delegation chain is an ordered list of links, each signed by its
//! declared delegator over the canonical link with the signature cleared.
//! Verification enforces chain depth, per-link signatures, and token TTLs;
//! any gap fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::digest_canonical_json;
use gait_core::signing::ArtifactSignature;
use gait_core::signing::KeyPair;
use gait_core::signing::SigningError;
use gait_core::signing::sign_digest_hex;
use gait_core::signing::verify_digest_hex;
use gait_core::signing::verifying_key_from_base64;
use gait_core::timestamp;

use crate::policy::DelegationRequirement;

// ============================================================================
// SECTION: Chain Model
// ============================================================================

/// One delegation link granting authority to a delegate.
///
/// # Invariants
/// - `signature` covers the canonical link with the signature field absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationLink {
    /// Delegator's Ed25519 public key (standard base64).
    pub delegator_public_key: String,
    /// Identity receiving the delegated authority.
    pub delegate: String,
    /// Scope label for the granted authority.
    #[serde(default)]
    pub scope: String,
    /// Expiry timestamp of the delegation token (RFC3339 UTC).
    pub expires_at: String,
    /// Delegator signature over the canonical link.
    #[serde(default)]
    pub signature: Option<ArtifactSignature>,
}

/// An ordered delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationChain {
    /// Stable reference for audit records.
    pub delegation_ref: String,
    /// Ordered links from root delegator to final delegate.
    pub links: Vec<DelegationLink>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Delegation verification errors.
///
/// # Invariants
/// - Variants are stable for reason-code mapping.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// The chain has no links.
    #[error("delegation chain is empty")]
    EmptyChain,
    /// Chain depth exceeds the policy limit.
    #[error("delegation depth {depth} exceeds limit {limit}")]
    DepthExceeded {
        /// Actual chain depth.
        depth: u64,
        /// Policy depth limit.
        limit: u64,
    },
    /// A link carries no signature.
    #[error("delegation link {index} is unsigned")]
    UnsignedLink {
        /// Zero-based link index.
        index: usize,
    },
    /// A link signature failed verification.
    #[error("delegation link {index} signature invalid: {source}")]
    InvalidSignature {
        /// Zero-based link index.
        index: usize,
        /// Underlying verification failure.
        #[source]
        source: SigningError,
    },
    /// A link token is expired.
    #[error("delegation link {index} expired at {expires_at}")]
    Expired {
        /// Zero-based link index.
        index: usize,
        /// Expiry carried by the link.
        expires_at: String,
    },
    /// A link timestamp failed to parse.
    #[error("delegation link {index} carries invalid expires_at: {value}")]
    InvalidExpiry {
        /// Zero-based link index.
        index: usize,
        /// Rejected timestamp value.
        value: String,
    },
    /// Canonicalization or digesting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<DelegationError> for gait_core::ClassifiedError {
    fn from(err: DelegationError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            DelegationError::Hash(inner) => inner.into(),
            other => Self::new(
                ErrorCategory::VerificationFailed,
                "delegation_invalid",
                other.to_string(),
            )
            .with_cause(other),
        }
    }
}

// ============================================================================
// SECTION: Link Digesting
// ============================================================================

/// Computes the canonical digest a link signature must cover.
fn link_digest(link: &DelegationLink) -> Result<Digest, DelegationError> {
    let mut unsigned = link.clone();
    unsigned.signature = None;
    Ok(digest_canonical_json(&unsigned)?)
}

/// Signs a delegation link with the delegator's key.
///
/// # Errors
///
/// Returns [`DelegationError::Hash`] when canonicalization fails.
pub fn sign_delegation_link(
    link: &DelegationLink,
    delegator: &KeyPair,
) -> Result<DelegationLink, DelegationError> {
    let digest = link_digest(link)?;
    let mut signed = link.clone();
    signed.signature = Some(sign_digest_hex(delegator, &digest));
    Ok(signed)
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a delegation chain against the policy requirement.
///
/// Checks chain depth, each link's delegator signature, and token TTLs
/// relative to `now` (RFC3339 UTC).
///
/// # Errors
///
/// Returns the first [`DelegationError`] encountered; any failure must be
/// treated as a `block`.
pub fn verify_delegation(
    chain: &DelegationChain,
    requirement: &DelegationRequirement,
    now: &str,
) -> Result<(), DelegationError> {
    if chain.links.is_empty() {
        return Err(DelegationError::EmptyChain);
    }
    let depth = chain.links.len() as u64;
    if depth > requirement.max_depth {
        return Err(DelegationError::DepthExceeded {
            depth,
            limit: requirement.max_depth,
        });
    }

    for (index, link) in chain.links.iter().enumerate() {
        let Some(signature) = &link.signature else {
            return Err(DelegationError::UnsignedLink {
                index,
            });
        };
        let key = verifying_key_from_base64(&link.delegator_public_key).map_err(|source| {
            DelegationError::InvalidSignature {
                index,
                source,
            }
        })?;
        let digest = link_digest(link)?;
        verify_digest_hex(&key, signature, &digest).map_err(|source| {
            DelegationError::InvalidSignature {
                index,
                source,
            }
        })?;

        let remaining = timestamp::age_seconds(now, &link.expires_at).map_err(|_| {
            DelegationError::InvalidExpiry {
                index,
                value: link.expires_at.clone(),
            }
        })?;
        if remaining <= 0 {
            return Err(DelegationError::Expired {
                index,
                expires_at: link.expires_at.clone(),
            });
        }
    }
    Ok(())
}
