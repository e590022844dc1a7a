// crates/gait-core/src/timestamp.rs
// ============================================================================
// Module: Gait Timestamp Model
// Description: RFC3339 UTC timestamp normalization and the deterministic epoch.
// Purpose: Keep time out of digests unless explicitly and deterministically set.
// Dependencies: time
// ============================================================================

//! ## Overview
//! All Gait timestamps are RFC3339 UTC strings. Missing or empty timestamps
//! normalize to the deterministic epoch `1980-01-01T00:00:00Z` so digests
//! never depend on wall-clock state. Wall-clock reads are confined to
//! [`now_rfc3339`], which callers use only for non-digest audit fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Deterministic epoch substituted for missing timestamps.
pub const DETERMINISTIC_EPOCH: &str = "1980-01-01T00:00:00Z";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or formatting timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// Timestamp string was not valid RFC3339.
    #[error("invalid rfc3339 timestamp: {value}")]
    Parse {
        /// Rejected timestamp value.
        value: String,
    },
    /// Timestamp could not be formatted back to RFC3339.
    #[error("failed to format timestamp: {0}")]
    Format(String),
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Parses an RFC3339 timestamp and re-renders it in UTC.
///
/// # Errors
///
/// Returns [`TimestampError`] when the value does not parse or format.
pub fn normalize_rfc3339(value: &str) -> Result<String, TimestampError> {
    let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| TimestampError::Parse {
        value: value.to_string(),
    })?;
    parsed
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| TimestampError::Format(err.to_string()))
}

/// Normalizes a timestamp, substituting the deterministic epoch when empty.
///
/// # Errors
///
/// Returns [`TimestampError`] when a non-empty value does not parse.
pub fn normalize_or_epoch(value: &str) -> Result<String, TimestampError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(DETERMINISTIC_EPOCH.to_string());
    }
    normalize_rfc3339(trimmed)
}

/// Returns the current wall-clock time as an RFC3339 UTC string.
///
/// Falls back to the deterministic epoch if formatting ever fails, so the
/// result is always a parseable timestamp.
#[must_use]
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| DETERMINISTIC_EPOCH.to_string())
}

/// Computes whole seconds elapsed between two RFC3339 timestamps.
///
/// Negative values mean `later` precedes `earlier`.
///
/// # Errors
///
/// Returns [`TimestampError`] when either value does not parse.
pub fn age_seconds(earlier: &str, later: &str) -> Result<i64, TimestampError> {
    let start = OffsetDateTime::parse(earlier, &Rfc3339).map_err(|_| TimestampError::Parse {
        value: earlier.to_string(),
    })?;
    let end = OffsetDateTime::parse(later, &Rfc3339).map_err(|_| TimestampError::Parse {
        value: later.to_string(),
    })?;
    Ok((end - start).whole_seconds())
}
