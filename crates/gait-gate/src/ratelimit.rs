// crates/gait-gate/src/ratelimit.rs
// ============================================================================
// Module: Rate Limit Enforcement
// Description: Shared-file token buckets serialized by the append lock.
// Purpose: Bound allowed outcomes across concurrent gate evaluations.
// Dependencies: crate::{intent, policy}, gait-core, serde_json, time
// ============================================================================

//! ## Overview
//! Rate-limit state is a JSON file of buckets keyed by scope. Every
//! enforcement acquires the cross-process lock, loads the state, rolls the
//! bucket window forward when needed, consumes one unit, and writes the
//! state back atomically. Under N concurrent evaluations with capacity K,
//! at most K are allowed; contention beyond the lock budget surfaces as a
//! retryable error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use gait_core::fsx;
use gait_core::fsx::AppendLock;
use gait_core::fsx::FsxError;
use gait_core::fsx::LockOptions;
use gait_core::hashing::canonical_json_bytes;

use crate::intent::IntentRequest;
use crate::policy::RateLimitSpec;
use crate::policy::RateScope;
use crate::policy::RateWindow;

// ============================================================================
// SECTION: State Model
// ============================================================================

/// One rate bucket in the shared state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RateBucket {
    /// Window start timestamp (RFC3339 UTC).
    window_start: String,
    /// Requests consumed within the window.
    count: u64,
}

/// The shared rate-limit state file content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
struct RateLimitState {
    /// Buckets keyed by scope key.
    #[serde(default)]
    buckets: BTreeMap<String, RateBucket>,
}

/// Decision rendered by one rate-limit enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Bucket scope key the decision applied to.
    pub scope_key: String,
    /// Requests permitted per window.
    pub limit: u64,
    /// Requests remaining after this decision.
    pub remaining: u64,
    /// Window start timestamp (RFC3339 UTC).
    pub window_start: String,
    /// True when this request fit the budget.
    pub allowed: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Rate-limit enforcement errors.
///
/// # Invariants
/// - `Contention` is retryable; everything else is not.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Lock budget exhausted while serializing bucket access.
    #[error("rate limit state contention after {waited_ms} ms")]
    Contention {
        /// Milliseconds spent waiting before giving up.
        waited_ms: u64,
    },
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(FsxError),
    /// State file content failed to parse.
    #[error("rate limit state parse error: {0}")]
    Parse(String),
    /// Evaluation timestamp failed to parse.
    #[error("invalid rate limit timestamp: {0}")]
    InvalidTime(String),
}

impl From<FsxError> for RateLimitError {
    fn from(err: FsxError) -> Self {
        match err {
            FsxError::LockContention {
                waited_ms, ..
            } => Self::Contention {
                waited_ms,
            },
            other => Self::Fsx(other),
        }
    }
}

impl From<RateLimitError> for gait_core::ClassifiedError {
    fn from(err: RateLimitError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            RateLimitError::Fsx(inner) => inner.into(),
            other => {
                let (category, code) = match &other {
                    RateLimitError::Contention { .. } => {
                        (ErrorCategory::StateContention, "rate_limit_contention")
                    }
                    RateLimitError::Parse(_) | RateLimitError::InvalidTime(_) => {
                        (ErrorCategory::InvalidInput, "rate_limit_state_invalid")
                    }
                    _ => (ErrorCategory::InternalFailure, "internal_failure"),
                };
                Self::new(category, code, other.to_string()).with_cause(other)
            }
        }
    }
}

// ============================================================================
// SECTION: Enforcement
// ============================================================================

/// Enforces a rate limit for one intent evaluation.
///
/// Read-modify-write under the cross-process lock: concurrent evaluations
/// of the same bucket are serialized, so allowed outcomes never exceed the
/// configured capacity.
///
/// # Errors
///
/// Returns [`RateLimitError::Contention`] (retryable) when the lock budget
/// is exhausted, and I/O or parse errors otherwise.
pub fn enforce_rate_limit(
    state_path: &Path,
    spec: &RateLimitSpec,
    intent: &IntentRequest,
    now: &str,
    lock_options: &LockOptions,
) -> Result<RateLimitDecision, RateLimitError> {
    let window_start = window_start(now, spec.window)?;
    let scope_key = scope_key(spec, intent);

    let _lock = AppendLock::acquire(state_path, lock_options)?;
    let mut state = load_state(state_path)?;

    let bucket = state.buckets.entry(scope_key.clone()).or_insert_with(|| RateBucket {
        window_start: window_start.clone(),
        count: 0,
    });
    if bucket.window_start != window_start {
        bucket.window_start = window_start.clone();
        bucket.count = 0;
    }
    bucket.count = bucket.count.saturating_add(1);
    let allowed = bucket.count <= spec.requests;
    let remaining = spec.requests.saturating_sub(bucket.count.min(spec.requests));

    let bytes = canonical_json_bytes(&state).map_err(|err| RateLimitError::Parse(err.to_string()))?;
    fsx::write_file_atomic(state_path, &bytes, fsx::DEFAULT_FILE_MODE)?;

    Ok(RateLimitDecision {
        scope_key,
        limit: spec.requests,
        remaining,
        window_start,
        allowed,
    })
}

/// Loads the state file, defaulting to empty when absent.
fn load_state(state_path: &Path) -> Result<RateLimitState, RateLimitError> {
    match fs::read(state_path) {
        Ok(bytes) => {
            serde_json::from_slice(&bytes).map_err(|err| RateLimitError::Parse(err.to_string()))
        }
        Err(_) => Ok(RateLimitState::default()),
    }
}

/// Builds the bucket key for a scope and intent.
fn scope_key(spec: &RateLimitSpec, intent: &IntentRequest) -> String {
    match spec.scope {
        RateScope::ToolIdentity => {
            format!("tool_identity|{}|{}", intent.tool_name, intent.context.identity)
        }
        RateScope::Tool => format!("tool|{}", intent.tool_name),
        RateScope::Identity => format!("identity|{}", intent.context.identity),
        RateScope::Global => "global".to_string(),
    }
}

/// Truncates an evaluation time to its window start.
fn window_start(now: &str, window: RateWindow) -> Result<String, RateLimitError> {
    let parsed = OffsetDateTime::parse(now, &Rfc3339)
        .map_err(|_| RateLimitError::InvalidTime(now.to_string()))?
        .to_offset(time::UtcOffset::UTC);
    let truncated = match window {
        RateWindow::Minute => parsed.replace_second(0).and_then(|dt| dt.replace_nanosecond(0)),
        RateWindow::Hour => parsed
            .replace_minute(0)
            .and_then(|dt| dt.replace_second(0))
            .and_then(|dt| dt.replace_nanosecond(0)),
        RateWindow::Day => parsed
            .replace_hour(0)
            .and_then(|dt| dt.replace_minute(0))
            .and_then(|dt| dt.replace_second(0))
            .and_then(|dt| dt.replace_nanosecond(0)),
    }
    .map_err(|err| RateLimitError::InvalidTime(err.to_string()))?;
    truncated.format(&Rfc3339).map_err(|err| RateLimitError::InvalidTime(err.to_string()))
}
