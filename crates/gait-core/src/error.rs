// crates/gait-core/src/error.rs
// ============================================================================
// Module: Gait Classified Errors
// Description: Classified error envelope shared across kernel components.
// Purpose: Give every failure a stable category, code, hint, and retry signal.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every Gait failure carries a category, a stable code, a retryable flag,
//! and an optional hint. Components map their module errors into
//! [`ClassifiedError`] at the API boundary; hosts render the wire-level
//! [`ErrorEnvelope`] and map categories to process exit codes.
//!
//! The kernel never recovers policy or verification failures locally; only
//! lock contention is retried within a bounded budget before surfacing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Category
// ============================================================================

/// Stable failure categories for classified errors.
///
/// # Invariants
/// - Variants are stable for serialization and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Schema, format, or parse failure in caller input.
    InvalidInput,
    /// Digest mismatch, invalid signature, or missing declared file.
    VerificationFailed,
    /// Gate verdict `block`.
    PolicyBlocked,
    /// Gate verdict `require_approval`.
    ApprovalRequired,
    /// Required artifact or key not found.
    DependencyMissing,
    /// Read, write, or stat error.
    IoFailure,
    /// Lock timeout or rate-limit race.
    StateContention,
    /// Retryable remote fault.
    NetworkTransient,
    /// Permanent remote fault.
    NetworkPermanent,
    /// Invariant violation inside the kernel.
    InternalFailure,
}

impl ErrorCategory {
    /// Returns the stable wire label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::VerificationFailed => "verification_failed",
            Self::PolicyBlocked => "policy_blocked",
            Self::ApprovalRequired => "approval_required",
            Self::DependencyMissing => "dependency_missing",
            Self::IoFailure => "io_failure",
            Self::StateContention => "state_contention",
            Self::NetworkTransient => "network_transient",
            Self::NetworkPermanent => "network_permanent",
            Self::InternalFailure => "internal_failure",
        }
    }

    /// Returns the default retryable flag for the category.
    #[must_use]
    pub const fn default_retryable(self) -> bool {
        matches!(self, Self::StateContention | Self::NetworkTransient)
    }

    /// Returns the process exit code for the category.
    ///
    /// Success and the non-`allow` verdict codes (`0`, `3`, `4`, `5`) are
    /// produced by the gate verdict mapping, not by error categories.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InvalidInput | Self::DependencyMissing => 6,
            Self::VerificationFailed | Self::StateContention => 2,
            Self::PolicyBlocked => 3,
            Self::ApprovalRequired => 4,
            Self::IoFailure
            | Self::NetworkTransient
            | Self::NetworkPermanent
            | Self::InternalFailure => 1,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Classified Error
// ============================================================================

/// Classified kernel error with stable code and retry semantics.
///
/// # Invariants
/// - `code` is a stable, machine-matchable identifier.
/// - `cause` preserves the original error for `source()` chains.
#[derive(Debug)]
pub struct ClassifiedError {
    /// Failure category.
    pub category: ErrorCategory,
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional remediation hint.
    pub hint: Option<String>,
    /// Whether the caller may retry.
    pub retryable: bool,
    /// Original cause, when one exists.
    pub cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl ClassifiedError {
    /// Creates a classified error with the category's default retry flag.
    #[must_use]
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            hint: None,
            retryable: category.default_retryable(),
            cause: None,
        }
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attaches the original cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Overrides the retryable flag.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wraps an unknown error as an internal failure, preserving the cause.
    #[must_use]
    pub fn internal(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::new(ErrorCategory::InternalFailure, "internal_failure", cause.to_string())
            .with_cause(cause)
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    /// Renders the wire-level error envelope.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error_code: self.code.clone(),
            error_category: self.category,
            retryable: self.retryable,
            hint: self.hint.clone(),
            message: self.message.clone(),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.category, self.code, self.message)
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn StdError + 'static))
    }
}

// ============================================================================
// SECTION: Classification Conversions
// ============================================================================

impl From<crate::fsx::FsxError> for ClassifiedError {
    fn from(err: crate::fsx::FsxError) -> Self {
        use crate::fsx::FsxError;
        let (category, code) = match &err {
            FsxError::Io { .. } => (ErrorCategory::IoFailure, "io_failure"),
            FsxError::InvalidPath { .. } => (ErrorCategory::InvalidInput, "invalid_path"),
            FsxError::LockContention { .. } => (ErrorCategory::StateContention, "lock_contention"),
        };
        Self::new(category, code, err.to_string()).with_cause(err)
    }
}

impl From<crate::hashing::HashError> for ClassifiedError {
    fn from(err: crate::hashing::HashError) -> Self {
        use crate::hashing::HashError;
        let code = match &err {
            HashError::Canonicalization(_) => "canonicalization_failed",
            HashError::SizeLimitExceeded { .. } => "payload_too_large",
            HashError::InvalidDigest { .. } => "invalid_digest",
        };
        Self::new(ErrorCategory::InvalidInput, code, err.to_string()).with_cause(err)
    }
}

impl From<crate::signing::SigningError> for ClassifiedError {
    fn from(err: crate::signing::SigningError) -> Self {
        use crate::signing::SigningError;
        let (category, code) = match &err {
            SigningError::KeySource(_) => (ErrorCategory::DependencyMissing, "key_source"),
            SigningError::InvalidKey(_) => (ErrorCategory::InvalidInput, "invalid_key"),
            SigningError::UnsupportedAlgorithm { .. }
            | SigningError::KeyIdMismatch { .. }
            | SigningError::MalformedSignature
            | SigningError::InvalidSignatureLength { .. }
            | SigningError::SignedDigestMismatch { .. }
            | SigningError::VerificationFailed => {
                (ErrorCategory::VerificationFailed, "signature_invalid")
            }
        };
        Self::new(category, code, err.to_string()).with_cause(err)
    }
}

impl From<crate::archive::ArchiveError> for ClassifiedError {
    fn from(err: crate::archive::ArchiveError) -> Self {
        use crate::archive::ArchiveError;
        match err {
            ArchiveError::Fsx(inner) => inner.into(),
            other => {
                let code = match &other {
                    ArchiveError::Zip(_) => "archive_malformed",
                    ArchiveError::EntryTooLarge { .. } => "entry_too_large",
                    ArchiveError::DuplicateEntry { .. } => "duplicate_entry",
                    ArchiveError::Fsx(_) => "io_failure",
                };
                Self::new(ErrorCategory::InvalidInput, code, other.to_string()).with_cause(other)
            }
        }
    }
}

impl From<crate::schema::SchemaError> for ClassifiedError {
    fn from(err: crate::schema::SchemaError) -> Self {
        use crate::schema::SchemaError;
        let (category, code) = match &err {
            SchemaError::UnknownSchema { .. } => {
                (ErrorCategory::InvalidInput, "unknown_schema")
            }
            SchemaError::Compile { .. } => (ErrorCategory::InternalFailure, "schema_compile"),
            SchemaError::Invalid { .. } => {
                (ErrorCategory::InvalidInput, "schema_validation_failed")
            }
        };
        Self::new(category, code, err.to_string()).with_cause(err)
    }
}

impl From<crate::env::EnvError> for ClassifiedError {
    fn from(err: crate::env::EnvError) -> Self {
        Self::new(ErrorCategory::InvalidInput, "invalid_environment", err.to_string())
            .with_cause(err)
    }
}

impl From<crate::timestamp::TimestampError> for ClassifiedError {
    fn from(err: crate::timestamp::TimestampError) -> Self {
        Self::new(ErrorCategory::InvalidInput, "invalid_timestamp", err.to_string()).with_cause(err)
    }
}

// ============================================================================
// SECTION: Error Envelope
// ============================================================================

/// Wire-level error envelope emitted by caller surfaces.
///
/// # Invariants
/// - `ok` is always `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes.
    pub ok: bool,
    /// Stable error code.
    pub error_code: String,
    /// Failure category.
    pub error_category: ErrorCategory,
    /// Whether the caller may retry.
    pub retryable: bool,
    /// Optional remediation hint.
    pub hint: Option<String>,
    /// Human-readable message.
    pub message: String,
}
