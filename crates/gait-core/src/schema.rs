// crates/gait-core/src/schema.rs
// ============================================================================
// Module: Gait Schema Registry
// Description: Embedded versioned JSON Schemas and artifact validation.
// Purpose: Keep readers and writers honest against the schemas/v1 contracts.
// Dependencies: jsonschema, serde, serde_json
// ============================================================================

//! ## Overview
//! Every Gait artifact carries `schema_id`, `schema_version`, `created_at`,
//! and `producer_version`. The JSON Schema documents under `schemas/v1/**`
//! are embedded here and validated with the `jsonschema` crate. Readers
//! tolerate unknown optional fields within a major version; schemas only
//! constrain the fields they name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Major schema version for all embedded contracts.
pub const SCHEMA_VERSION: &str = "v1";

/// Version of the producer emitting artifacts.
pub const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Schema Identifiers
// ============================================================================

/// Stable schema identifiers for embedded contracts.
pub mod ids {
    /// Runpack manifest.
    pub const RUNPACK_MANIFEST: &str = "runpack/manifest";
    /// Run record.
    pub const RUNPACK_RUN: &str = "runpack/run";
    /// Run context references.
    pub const RUNPACK_REFS: &str = "runpack/refs";
    /// Captured intent entry.
    pub const RUNPACK_INTENT: &str = "runpack/intent";
    /// Captured result entry.
    pub const RUNPACK_RESULT: &str = "runpack/result";
    /// Session journal event.
    pub const RUNPACK_SESSION_EVENT: &str = "runpack/session_event";
    /// Session checkpoint.
    pub const RUNPACK_SESSION_CHECKPOINT: &str = "runpack/session_checkpoint";
    /// Gate policy.
    pub const GATE_POLICY: &str = "gate/policy";
    /// Gate intent request.
    pub const GATE_INTENT_REQUEST: &str = "gate/intent_request";
    /// Gate result.
    pub const GATE_RESULT: &str = "gate/result";
    /// Gate trace record.
    pub const GATE_TRACE_RECORD: &str = "gate/trace_record";
    /// Approval audit record.
    pub const GATE_APPROVAL_AUDIT: &str = "gate/approval_audit";
    /// Delegation audit record.
    pub const GATE_DELEGATION_AUDIT: &str = "gate/delegation_audit";
    /// Context envelope.
    pub const CONTEXT_ENVELOPE: &str = "context/envelope";
    /// Context reference record.
    pub const CONTEXT_REFERENCE_RECORD: &str = "context/reference_record";
    /// Context budget report.
    pub const CONTEXT_BUDGET_REPORT: &str = "context/budget_report";
    /// Evidence pack manifest.
    pub const GUARD_PACK_MANIFEST: &str = "guard/pack_manifest";
    /// Regression result.
    pub const REGRESS_RESULT: &str = "regress/result";
    /// Inventory snapshot.
    pub const SCOUT_INVENTORY_SNAPSHOT: &str = "scout/inventory_snapshot";
}

/// Embedded schema documents keyed by schema identifier.
const REGISTRY: &[(&str, &str)] = &[
    (ids::RUNPACK_MANIFEST, include_str!("../../../schemas/v1/runpack/manifest.json")),
    (ids::RUNPACK_RUN, include_str!("../../../schemas/v1/runpack/run.json")),
    (ids::RUNPACK_REFS, include_str!("../../../schemas/v1/runpack/refs.json")),
    (ids::RUNPACK_INTENT, include_str!("../../../schemas/v1/runpack/intent.json")),
    (ids::RUNPACK_RESULT, include_str!("../../../schemas/v1/runpack/result.json")),
    (ids::RUNPACK_SESSION_EVENT, include_str!("../../../schemas/v1/runpack/session_event.json")),
    (
        ids::RUNPACK_SESSION_CHECKPOINT,
        include_str!("../../../schemas/v1/runpack/session_checkpoint.json"),
    ),
    (ids::GATE_POLICY, include_str!("../../../schemas/v1/gate/policy.json")),
    (ids::GATE_INTENT_REQUEST, include_str!("../../../schemas/v1/gate/intent_request.json")),
    (ids::GATE_RESULT, include_str!("../../../schemas/v1/gate/result.json")),
    (ids::GATE_TRACE_RECORD, include_str!("../../../schemas/v1/gate/trace_record.json")),
    (ids::GATE_APPROVAL_AUDIT, include_str!("../../../schemas/v1/gate/approval_audit.json")),
    (ids::GATE_DELEGATION_AUDIT, include_str!("../../../schemas/v1/gate/delegation_audit.json")),
    (ids::CONTEXT_ENVELOPE, include_str!("../../../schemas/v1/context/envelope.json")),
    (
        ids::CONTEXT_REFERENCE_RECORD,
        include_str!("../../../schemas/v1/context/reference_record.json"),
    ),
    (ids::CONTEXT_BUDGET_REPORT, include_str!("../../../schemas/v1/context/budget_report.json")),
    (ids::GUARD_PACK_MANIFEST, include_str!("../../../schemas/v1/guard/pack_manifest.json")),
    (ids::REGRESS_RESULT, include_str!("../../../schemas/v1/regress/result.json")),
    (
        ids::SCOUT_INVENTORY_SNAPSHOT,
        include_str!("../../../schemas/v1/scout/inventory_snapshot.json"),
    ),
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema registry and validation errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Schema identifier is not in the embedded registry.
    #[error("unknown schema id: {schema_id}")]
    UnknownSchema {
        /// Requested schema identifier.
        schema_id: String,
    },
    /// Embedded schema document failed to parse or compile.
    #[error("schema {schema_id} failed to compile: {reason}")]
    Compile {
        /// Schema identifier.
        schema_id: String,
        /// Compiler failure description.
        reason: String,
    },
    /// Instance failed validation against the schema.
    #[error("value failed validation against {schema_id}: {}", errors.join("; "))]
    Invalid {
        /// Schema identifier.
        schema_id: String,
        /// Instance-path-prefixed validation errors.
        errors: Vec<String>,
    },
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Returns the parsed schema document for an identifier.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownSchema`] for unregistered identifiers and
/// [`SchemaError::Compile`] when the embedded document does not parse.
pub fn schema_document(schema_id: &str) -> Result<Value, SchemaError> {
    let (_, text) = REGISTRY.iter().find(|(id, _)| *id == schema_id).ok_or_else(|| {
        SchemaError::UnknownSchema {
            schema_id: schema_id.to_string(),
        }
    })?;
    serde_json::from_str(text).map_err(|err| SchemaError::Compile {
        schema_id: schema_id.to_string(),
        reason: err.to_string(),
    })
}

/// Validates a JSON value against an embedded schema.
///
/// # Errors
///
/// Returns [`SchemaError::Invalid`] with every violation message when the
/// value does not conform.
pub fn validate_value(schema_id: &str, value: &Value) -> Result<(), SchemaError> {
    let schema = schema_document(schema_id)?;
    let validator = jsonschema::validator_for(&schema).map_err(|err| SchemaError::Compile {
        schema_id: schema_id.to_string(),
        reason: err.to_string(),
    })?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|err| format!("{}: {}", err.instance_path(), err))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid {
            schema_id: schema_id.to_string(),
            errors,
        })
    }
}

// ============================================================================
// SECTION: Artifact Header
// ============================================================================

/// Common header carried by every Gait artifact.
///
/// # Invariants
/// - `schema_version` matches the embedded registry major version.
/// - `created_at` is RFC3339 UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Stable schema identifier.
    #[serde(default)]
    pub schema_id: String,
    /// Major schema version.
    #[serde(default)]
    pub schema_version: String,
    /// Creation timestamp (RFC3339 UTC).
    #[serde(default)]
    pub created_at: String,
    /// Producer version string.
    #[serde(default)]
    pub producer_version: String,
}

impl ArtifactHeader {
    /// Creates a header stamped with the current wall-clock time.
    #[must_use]
    pub fn new(schema_id: &str) -> Self {
        Self {
            schema_id: schema_id.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: timestamp::now_rfc3339(),
            producer_version: PRODUCER_VERSION.to_string(),
        }
    }

    /// Creates a header stamped with the deterministic epoch.
    ///
    /// Used when the artifact participates in digest computation and must
    /// not depend on wall-clock state.
    #[must_use]
    pub fn deterministic(schema_id: &str) -> Self {
        Self {
            schema_id: schema_id.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: timestamp::DETERMINISTIC_EPOCH.to_string(),
            producer_version: PRODUCER_VERSION.to_string(),
        }
    }
}
