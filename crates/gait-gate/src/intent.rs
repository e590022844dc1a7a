// crates/gait-gate/src/intent.rs
// ============================================================================
// Module: Intent Request Model
// Description: Intent normalization and canonical digesting.
// Purpose: Give every tool invocation a stable, digestable canonical form.
// Dependencies: crate::delegation, gait-context, gait-core, serde, serde_json
// ============================================================================

//! ## Overview
//! An intent request is a tool invocation at the execution boundary.
//! Normalization trims strings, defaults identity, workspace, and risk
//! class outside strict mode, infers target kinds from the legacy single
//! `target` string, and produces `args_digest` and `intent_digest` over the
//! canonical form with the artifact header pinned to the deterministic
//! epoch. Equal logical intents digest equally regardless of capture time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use gait_context::EvidenceMode;
use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;

use crate::delegation::DelegationChain;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Risk classification attached to an intent context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Routine, reversible operation.
    #[default]
    Low,
    /// Operation with limited blast radius.
    Medium,
    /// Operation touching sensitive targets.
    High,
    /// Operation with irreversible or broad impact.
    Critical,
}

impl RiskClass {
    /// Returns the stable wire label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Target kind for an intent target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Filesystem path.
    Path,
    /// Network host.
    Host,
    /// Full URL.
    Url,
    /// Anything else.
    Other,
}

impl TargetKind {
    /// Returns the stable wire label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Host => "host",
            Self::Url => "url",
            Self::Other => "other",
        }
    }
}

// ============================================================================
// SECTION: Intent Components
// ============================================================================

/// One target of an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Target kind.
    pub kind: TargetKind,
    /// Target value (path, host name, or URL).
    pub value: String,
    /// Operation applied to the target.
    #[serde(default)]
    pub operation: String,
    /// Sensitivity label for the target.
    #[serde(default)]
    pub sensitivity: String,
}

/// Provenance of one argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgProvenance {
    /// JSON path of the argument.
    pub arg_path: String,
    /// Source family the value came from.
    pub source: String,
    /// Source reference within the family.
    #[serde(default)]
    pub source_ref: String,
    /// Integrity digest of the sourced value.
    #[serde(default)]
    pub integrity_digest: String,
}

/// Caller context attached to an intent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentContext {
    /// Acting identity.
    #[serde(default)]
    pub identity: String,
    /// Workspace the intent runs in.
    #[serde(default)]
    pub workspace: String,
    /// Risk classification.
    #[serde(default)]
    pub risk_class: RiskClass,
    /// Session identifier.
    #[serde(default)]
    pub session_id: String,
    /// Request identifier.
    #[serde(default)]
    pub request_id: String,
    /// Authentication context label.
    #[serde(default)]
    pub auth_context: String,
    /// Credential scopes granted to the caller.
    #[serde(default)]
    pub credential_scopes: Vec<String>,
    /// Environment fingerprint.
    #[serde(default)]
    pub environment_fingerprint: String,
    /// Context set digest carried as evidence.
    #[serde(default)]
    pub context_set_digest: String,
    /// Context evidence mode for the intent.
    #[serde(default)]
    pub context_evidence_mode: Option<EvidenceMode>,
    /// Age of the context evidence in seconds.
    #[serde(default)]
    pub context_age_seconds: Option<u64>,
    /// Context reference identifiers.
    #[serde(default)]
    pub context_refs: Vec<String>,
}

/// One step of a multi-step script intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Tool name the step targets.
    pub tool_name: String,
    /// Step arguments.
    #[serde(default)]
    pub args: Option<Value>,
}

/// Ordered multi-step script attached to an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Ordered steps.
    pub steps: Vec<ScriptStep>,
}

// ============================================================================
// SECTION: Intent Request
// ============================================================================

/// A normalized tool invocation at the execution boundary.
///
/// # Invariants
/// - After normalization the canonical JSON has a stable `intent_digest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Tool name the intent targets.
    pub tool_name: String,
    /// Tool arguments as a JSON mapping.
    #[serde(default)]
    pub args: Option<Value>,
    /// Ordered intent targets.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Legacy single target string, consumed by normalization.
    #[serde(default)]
    pub target: Option<String>,
    /// Argument provenance records.
    #[serde(default)]
    pub arg_provenance: Vec<ArgProvenance>,
    /// Caller context.
    #[serde(default)]
    pub context: IntentContext,
    /// Delegation chain, when the caller acts on behalf of another.
    #[serde(default)]
    pub delegation: Option<DelegationChain>,
    /// Multi-step script, when the intent is composite.
    #[serde(default)]
    pub script: Option<Script>,
}

/// A normalized intent with its canonical digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIntent {
    /// Normalized request.
    pub request: IntentRequest,
    /// Canonical digest of the arguments.
    pub args_digest: Digest,
    /// Canonical digest of the normalized intent.
    pub intent_digest: Digest,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Intent normalization errors.
#[derive(Debug, Error)]
pub enum IntentError {
    /// Tool name was empty after trimming.
    #[error("intent tool_name must be non-empty")]
    EmptyToolName,
    /// A required context field was empty in strict mode.
    #[error("strict mode requires context field {field}")]
    MissingContextField {
        /// Missing field name.
        field: &'static str,
    },
    /// Arguments were not a JSON mapping.
    #[error("intent args must be a json mapping")]
    ArgsNotMapping,
    /// A script step carried an empty tool name.
    #[error("script steps require non-empty tool names")]
    EmptyScriptStep,
    /// Canonicalization or digesting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<IntentError> for gait_core::ClassifiedError {
    fn from(err: IntentError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            IntentError::Hash(inner) => inner.into(),
            other => Self::new(ErrorCategory::InvalidInput, "intent_invalid", other.to_string())
                .with_cause(other),
        }
    }
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Default identity assigned outside strict mode.
const DEFAULT_IDENTITY: &str = "anonymous";

/// Default workspace assigned outside strict mode.
const DEFAULT_WORKSPACE: &str = "local";

/// Normalizes an intent and computes its canonical digests.
///
/// In strict mode, empty identity or workspace fields are rejected instead
/// of defaulted.
///
/// # Errors
///
/// Returns [`IntentError`] for structurally invalid intents.
pub fn normalize_intent(intent: &IntentRequest, strict: bool) -> Result<NormalizedIntent, IntentError> {
    let mut request = intent.clone();

    request.tool_name = request.tool_name.trim().to_string();
    if request.tool_name.is_empty() {
        return Err(IntentError::EmptyToolName);
    }
    if let Some(args) = &request.args
        && !args.is_object()
    {
        return Err(IntentError::ArgsNotMapping);
    }

    normalize_context(&mut request.context, strict)?;
    normalize_targets(&mut request)?;
    if let Some(script) = &request.script {
        for step in &script.steps {
            if step.tool_name.trim().is_empty() {
                return Err(IntentError::EmptyScriptStep);
            }
        }
    }

    let args_digest = digest_canonical_json(request.args.as_ref().unwrap_or(&Value::Null))?;
    let intent_digest = intent_digest(&request)?;

    Ok(NormalizedIntent {
        request,
        args_digest,
        intent_digest,
    })
}

/// Normalizes the caller context, defaulting or rejecting empty fields.
fn normalize_context(context: &mut IntentContext, strict: bool) -> Result<(), IntentError> {
    context.identity = context.identity.trim().to_string();
    context.workspace = context.workspace.trim().to_string();
    context.context_set_digest = context.context_set_digest.trim().to_ascii_lowercase();
    if context.identity.is_empty() {
        if strict {
            return Err(IntentError::MissingContextField {
                field: "identity",
            });
        }
        context.identity = DEFAULT_IDENTITY.to_string();
    }
    if context.workspace.is_empty() {
        if strict {
            return Err(IntentError::MissingContextField {
                field: "workspace",
            });
        }
        context.workspace = DEFAULT_WORKSPACE.to_string();
    }
    Ok(())
}

/// Normalizes targets and folds the legacy single target string.
fn normalize_targets(request: &mut IntentRequest) -> Result<(), IntentError> {
    if request.targets.is_empty()
        && let Some(legacy) = request.target.take()
    {
        let trimmed = legacy.trim();
        if !trimmed.is_empty() {
            request.targets.push(infer_target(trimmed));
        }
    } else {
        request.target = None;
    }

    for target in &mut request.targets {
        target.value = target.value.trim().to_string();
        target.operation = target.operation.trim().to_ascii_lowercase();
        target.sensitivity = target.sensitivity.trim().to_ascii_lowercase();
        if target.kind == TargetKind::Host {
            target.value = target.value.to_ascii_lowercase();
        }
    }
    Ok(())
}

/// Infers a target kind from a legacy single target string.
fn infer_target(value: &str) -> Target {
    let kind = if value.contains("://") {
        TargetKind::Url
    } else if value.contains('/') {
        TargetKind::Path
    } else {
        TargetKind::Host
    };
    Target {
        kind,
        value: value.to_string(),
        operation: String::new(),
        sensitivity: String::new(),
    }
}

/// Computes the canonical intent digest with the header pinned.
fn intent_digest(request: &IntentRequest) -> Result<Digest, IntentError> {
    let mut pinned = request.clone();
    pinned.header = ArtifactHeader::deterministic(ids::GATE_INTENT_REQUEST);
    Ok(digest_canonical_json(&pinned)?)
}
