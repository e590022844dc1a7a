// crates/gait-core/src/env.rs
// ============================================================================
// Module: Gait Environment Variables
// Description: Typed readers for the GAIT_* environment variables.
// Purpose: Centralize the environment surface the kernel observes.
// Dependencies: base64, std
// ============================================================================

//! ## Overview
//! The kernel observes a small, fixed set of environment variables: key
//! material, session lock tuning, and the reserved encryption key. Every
//! read goes through this module so the observed surface stays auditable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use thiserror::Error;

// ============================================================================
// SECTION: Variable Names
// ============================================================================

/// Private signing key (base64 or hex).
pub const ENV_PRIVATE_KEY: &str = "GAIT_PRIVATE_KEY";
/// Declared public key checked against the loaded private key.
pub const ENV_PUBLIC_KEY: &str = "GAIT_PUBLIC_KEY";
/// Session lock profile selector (`standard` or `swarm`).
pub const ENV_LOCK_PROFILE: &str = "GAIT_SESSION_LOCK_PROFILE";
/// Session lock acquisition timeout override, in seconds.
pub const ENV_LOCK_TIMEOUT: &str = "GAIT_SESSION_LOCK_TIMEOUT";
/// Session lock retry delay override, in milliseconds.
pub const ENV_LOCK_RETRY: &str = "GAIT_SESSION_LOCK_RETRY";
/// Session lock staleness threshold override, in seconds.
pub const ENV_LOCK_STALE_AFTER: &str = "GAIT_SESSION_LOCK_STALE_AFTER";
/// Reserved checkpoint-at-rest encryption key (validated, never used to encrypt).
pub const ENV_ENCRYPTION_KEY: &str = "GAIT_ENCRYPTION_KEY";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when an observed variable is malformed.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Variable value failed validation.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Readers
// ============================================================================

/// Reads a variable, returning `None` when unset or blank.
#[must_use]
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Reads a variable as an unsigned integer.
#[must_use]
pub fn u64_var(name: &str) -> Option<u64> {
    var(name).and_then(|value| value.parse().ok())
}

/// Reads and validates the reserved encryption key.
///
/// The kernel performs no encryption; the value is validated (32 bytes of
/// standard base64) so misconfigured hosts fail fast at session start.
///
/// # Errors
///
/// Returns [`EnvError::Invalid`] when the value is set but malformed.
pub fn encryption_key() -> Result<Option<[u8; 32]>, EnvError> {
    let Some(encoded) = var(ENV_ENCRYPTION_KEY) else {
        return Ok(None);
    };
    let bytes = Base64.decode(&encoded).map_err(|_| EnvError::Invalid {
        name: ENV_ENCRYPTION_KEY.to_string(),
        reason: "value is not standard base64".to_string(),
    })?;
    let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| EnvError::Invalid {
        name: ENV_ENCRYPTION_KEY.to_string(),
        reason: "decoded key must be exactly 32 bytes".to_string(),
    })?;
    Ok(Some(key))
}
