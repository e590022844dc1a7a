// crates/gait-gate/src/eval.rs
// ============================================================================
// Module: Gate Evaluation
// Description: Rule evaluation, constraint checks, and verdict composition.
// Purpose: Produce deterministic gate results with sorted reason codes.
// Dependencies: crate::{delegation, endpoint, intent, policy, ratelimit},
// gait-core, serde
// ============================================================================

//! ## Overview
//! Rules evaluate in priority order; the first match determines the effect
//! unless a constraint violation escalates it. Context-evidence rules fail
//! closed: missing digests, mode mismatches, stale evidence, and unknown
//! endpoint classes all block. Reason codes and violations are sorted and
//! deduplicated so downstream systems can match them literally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use gait_context::EvidenceMode;
use gait_core::fsx::LockOptions;
use gait_core::fsx::LockProfile;
use gait_core::hashing::Digest;
use gait_core::timestamp;

use crate::delegation::DelegationError;
use crate::delegation::verify_delegation;
use crate::endpoint::classify_endpoint;
use crate::intent::IntentError;
use crate::intent::IntentRequest;
use crate::intent::NormalizedIntent;
use crate::intent::Target;
use crate::intent::TargetKind;
use crate::intent::normalize_intent;
use crate::policy::DestructiveActionPolicy;
use crate::policy::Policy;
use crate::policy::PolicyError;
use crate::policy::PolicyRule;
use crate::policy::Verdict;
use crate::policy::policy_digest;
use crate::ratelimit::RateLimitDecision;
use crate::ratelimit::RateLimitError;
use crate::ratelimit::enforce_rate_limit;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Stable reason codes emitted by gate evaluation.
pub mod reason {
    /// No rule matched; the default verdict applied.
    pub const DEFAULT_VERDICT: &str = "default_verdict";
    /// A rate limit budget was exhausted.
    pub const RATE_LIMITED: &str = "rate_limited";
    /// Required context evidence was absent.
    pub const CONTEXT_EVIDENCE_MISSING: &str = "context_evidence_missing";
    /// Context evidence mode did not satisfy the rule.
    pub const CONTEXT_EVIDENCE_MODE_MISMATCH: &str = "context_evidence_mode_mismatch";
    /// Context evidence exceeded the allowed age.
    pub const CONTEXT_FRESHNESS_EXCEEDED: &str = "context_freshness_exceeded";
    /// A target's endpoint class could not be determined.
    pub const ENDPOINT_CLASS_UNKNOWN: &str = "endpoint_class_unknown";
    /// An unknown endpoint class was rejected on a fail-closed path.
    pub const FAIL_CLOSED_ENDPOINT_CLASS_UNKNOWN: &str = "fail_closed_endpoint_class_unknown";
    /// A path target hit the denylist.
    pub const PATH_DENIED: &str = "path_denied";
    /// A path target fell outside the allowlist.
    pub const PATH_NOT_ALLOWED: &str = "path_not_allowed";
    /// A domain target hit the denylist.
    pub const DOMAIN_DENIED: &str = "domain_denied";
    /// A domain target fell outside the allowlist.
    pub const DOMAIN_NOT_ALLOWED: &str = "domain_not_allowed";
    /// Network egress used a class outside the permitted set.
    pub const EGRESS_CLASS_BLOCKED: &str = "egress_class_blocked";
    /// A destructive operation was rejected.
    pub const DESTRUCTIVE_ACTION_BLOCKED: &str = "destructive_action_blocked";
    /// Delegation evidence was required but absent.
    pub const DELEGATION_MISSING: &str = "delegation_missing";
    /// Delegation evidence failed verification.
    pub const DELEGATION_INVALID: &str = "delegation_invalid";
    /// Delegation chain exceeded the permitted depth.
    pub const DELEGATION_DEPTH_EXCEEDED: &str = "delegation_depth_exceeded";
    /// A delegation token was expired.
    pub const DELEGATION_EXPIRED: &str = "delegation_expired";
}

// ============================================================================
// SECTION: Result Types
// ============================================================================

/// Context-evidence conformance snapshot for a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConformance {
    /// A context set digest was present.
    pub evidence_present: bool,
    /// The evidence mode satisfied the rule.
    pub mode_matched: bool,
    /// The evidence age satisfied the rule.
    pub fresh: bool,
}

/// Deterministic gate decision.
///
/// # Invariants
/// - `reason_codes` and `violations` are sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// Final verdict.
    pub verdict: Verdict,
    /// Sorted, deduplicated reason codes.
    pub reason_codes: Vec<String>,
    /// Sorted, deduplicated constraint violations.
    pub violations: Vec<String>,
    /// Name of the rule that determined the effect.
    pub matched_rule: Option<String>,
    /// Rate limit decision when one was enforced.
    pub rate_limit: Option<RateLimitDecision>,
    /// Context conformance snapshot when a rule required evidence.
    pub context_conformance: Option<ContextConformance>,
}

// ============================================================================
// SECTION: Pure Evaluation
// ============================================================================

/// Evaluates a policy against a normalized intent.
///
/// Pure and deterministic: equal inputs produce equal outputs including
/// reason-code order. Rate limits are recorded by rule but enforced
/// separately through [`gate_intent`].
#[must_use]
pub fn evaluate_policy(policy: &Policy, intent: &NormalizedIntent, now: &str) -> GateResult {
    let mut reasons: Vec<String> = Vec::new();
    let mut violations: Vec<String> = Vec::new();
    let mut context_conformance = None;

    let matched = policy.rules.iter().find(|rule| rule_matches(rule, intent));
    let (verdict, matched_rule) = match matched {
        Some(rule) => {
            let mut verdict = rule.effect;
            if verdict != Verdict::Allow {
                reasons.push(rule.name.clone());
            }
            let escalation = check_constraints(rule, intent, now, &mut reasons, &mut violations);
            if let Some(stricter) = escalation {
                verdict = strictest(verdict, stricter);
            }
            context_conformance =
                check_context_evidence(rule, intent, &mut reasons).map(|conformance| {
                    if !(conformance.evidence_present
                        && conformance.mode_matched
                        && conformance.fresh)
                    {
                        verdict = strictest(verdict, Verdict::Block);
                    }
                    conformance
                });
            (verdict, Some(rule.name.clone()))
        }
        None => {
            reasons.push(reason::DEFAULT_VERDICT.to_string());
            (policy.default_verdict, None)
        }
    };

    reasons.sort();
    reasons.dedup();
    violations.sort();
    violations.dedup();

    GateResult {
        verdict,
        reason_codes: reasons,
        violations,
        matched_rule,
        rate_limit: None,
        context_conformance,
    }
}

/// Returns the stricter of two verdicts.
const fn strictest(left: Verdict, right: Verdict) -> Verdict {
    const fn rank(verdict: Verdict) -> u8 {
        match verdict {
            Verdict::Block => 3,
            Verdict::RequireApproval => 2,
            Verdict::DryRun => 1,
            Verdict::Allow => 0,
        }
    }
    if rank(left) >= rank(right) { left } else { right }
}

// ============================================================================
// SECTION: Rule Matching
// ============================================================================

/// Returns true when every non-empty match set accepts the intent.
fn rule_matches(rule: &PolicyRule, intent: &NormalizedIntent) -> bool {
    let request = &intent.request;
    let matcher = &rule.matcher;

    if !matcher.tool_names.is_empty()
        && !matcher.tool_names.contains(&request.tool_name.to_ascii_lowercase())
    {
        return false;
    }
    if !matcher.risk_classes.is_empty()
        && !matcher.risk_classes.contains(&request.context.risk_class.as_str().to_string())
    {
        return false;
    }
    if !matcher.context_classes.is_empty()
        && !matcher.context_classes.contains(&request.context.auth_context.to_ascii_lowercase())
    {
        return false;
    }
    if !matcher.target_kinds.is_empty()
        && !request
            .targets
            .iter()
            .any(|target| matcher.target_kinds.contains(&target.kind.as_str().to_string()))
    {
        return false;
    }
    if !matcher.target_values.is_empty()
        && !request
            .targets
            .iter()
            .any(|target| matcher.target_values.contains(&target.value.to_ascii_lowercase()))
    {
        return false;
    }
    if !matcher.endpoint_classes.is_empty()
        && !request.targets.iter().any(|target| {
            classify_endpoint(target)
                .is_some_and(|class| matcher.endpoint_classes.contains(&class.as_str().to_string()))
        })
    {
        return false;
    }
    true
}

// ============================================================================
// SECTION: Constraint Checks
// ============================================================================

/// Records a needed escalation, keeping the strictest verdict seen.
fn bump(escalation: &mut Option<Verdict>, verdict: Verdict) {
    *escalation = Some(escalation.map_or(verdict, |current| strictest(current, verdict)));
}

/// Checks rule constraints, recording violations and the needed escalation.
fn check_constraints(
    rule: &PolicyRule,
    intent: &NormalizedIntent,
    now: &str,
    reasons: &mut Vec<String>,
    violations: &mut Vec<String>,
) -> Option<Verdict> {
    let constraints = &rule.constraints;
    let mut escalation: Option<Verdict> = None;

    for target in &intent.request.targets {
        if target.kind == TargetKind::Path {
            check_path_constraints(constraints, target, violations, &mut escalation);
        }
        if matches!(target.kind, TargetKind::Host | TargetKind::Url) {
            check_domain_constraints(constraints, target, violations, &mut escalation);
            check_egress_constraints(constraints, target, reasons, violations, &mut escalation);
        }
        if let Some(action) = constraints.destructive_action
            && is_destructive(target)
        {
            violations.push(reason::DESTRUCTIVE_ACTION_BLOCKED.to_string());
            let verdict = match action {
                DestructiveActionPolicy::Forbid => Verdict::Block,
                DestructiveActionPolicy::RequireApproval => Verdict::RequireApproval,
            };
            bump(&mut escalation, verdict);
        }
    }

    if let Some(requirement) = constraints.require_delegation {
        match &intent.request.delegation {
            None => {
                reasons.push(reason::DELEGATION_MISSING.to_string());
                bump(&mut escalation, Verdict::Block);
            }
            Some(chain) => {
                if let Err(err) = verify_delegation(chain, &requirement, now) {
                    reasons.push(delegation_reason(&err).to_string());
                    bump(&mut escalation, Verdict::Block);
                }
            }
        }
    }

    escalation
}

/// Maps a delegation failure to its stable reason code.
const fn delegation_reason(err: &DelegationError) -> &'static str {
    match err {
        DelegationError::EmptyChain => reason::DELEGATION_MISSING,
        DelegationError::DepthExceeded { .. } => reason::DELEGATION_DEPTH_EXCEEDED,
        DelegationError::Expired { .. } => reason::DELEGATION_EXPIRED,
        DelegationError::UnsignedLink { .. }
        | DelegationError::InvalidSignature { .. }
        | DelegationError::InvalidExpiry { .. }
        | DelegationError::Hash(_) => reason::DELEGATION_INVALID,
    }
}

/// Checks path allow and deny lists for one path target.
fn check_path_constraints(
    constraints: &crate::policy::RuleConstraints,
    target: &Target,
    violations: &mut Vec<String>,
    escalation: &mut Option<Verdict>,
) {
    if constraints.path_denylist.iter().any(|prefix| target.value.starts_with(prefix)) {
        violations.push(reason::PATH_DENIED.to_string());
        bump(escalation, Verdict::Block);
    }
    if !constraints.path_allowlist.is_empty()
        && !constraints.path_allowlist.iter().any(|prefix| target.value.starts_with(prefix))
    {
        violations.push(reason::PATH_NOT_ALLOWED.to_string());
        bump(escalation, Verdict::Block);
    }
}

/// Checks domain allow and deny lists for one network target.
fn check_domain_constraints(
    constraints: &crate::policy::RuleConstraints,
    target: &Target,
    violations: &mut Vec<String>,
    escalation: &mut Option<Verdict>,
) {
    let Some(host) = target_host(target) else {
        return;
    };
    if constraints.domain_denylist.iter().any(|domain| domain_matches(&host, domain)) {
        violations.push(reason::DOMAIN_DENIED.to_string());
        bump(escalation, Verdict::Block);
    }
    if !constraints.domain_allowlist.is_empty()
        && !constraints.domain_allowlist.iter().any(|domain| domain_matches(&host, domain))
    {
        violations.push(reason::DOMAIN_NOT_ALLOWED.to_string());
        bump(escalation, Verdict::Block);
    }
}

/// Checks the egress-class constraint for one network target.
fn check_egress_constraints(
    constraints: &crate::policy::RuleConstraints,
    target: &Target,
    reasons: &mut Vec<String>,
    violations: &mut Vec<String>,
    escalation: &mut Option<Verdict>,
) {
    if constraints.egress_classes.is_empty() {
        return;
    }
    match classify_endpoint(target) {
        Some(class) => {
            if !constraints.egress_classes.contains(&class.as_str().to_string()) {
                violations.push(reason::EGRESS_CLASS_BLOCKED.to_string());
                bump(escalation, Verdict::Block);
            }
        }
        None => {
            reasons.push(reason::FAIL_CLOSED_ENDPOINT_CLASS_UNKNOWN.to_string());
            reasons.push(reason::ENDPOINT_CLASS_UNKNOWN.to_string());
            bump(escalation, Verdict::Block);
        }
    }
}

/// Extracts the host of a network target.
fn target_host(target: &Target) -> Option<String> {
    match target.kind {
        TargetKind::Host => Some(target.value.to_ascii_lowercase()),
        TargetKind::Url => Url::parse(&target.value)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase)),
        TargetKind::Path | TargetKind::Other => None,
    }
}

/// Returns true when a host equals a domain or is one of its subdomains.
fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Operations treated as destructive.
const DESTRUCTIVE_OPERATIONS: &[&str] =
    &["delete", "remove", "unlink", "truncate", "destroy", "drop", "kill"];

/// Returns true when the target's operation is destructive.
fn is_destructive(target: &Target) -> bool {
    DESTRUCTIVE_OPERATIONS.contains(&target.operation.as_str())
}

// ============================================================================
// SECTION: Context Evidence
// ============================================================================

/// Checks context-evidence requirements, recording reason codes.
fn check_context_evidence(
    rule: &PolicyRule,
    intent: &NormalizedIntent,
    reasons: &mut Vec<String>,
) -> Option<ContextConformance> {
    let constraints = &rule.constraints;
    if !constraints.require_context_evidence {
        return None;
    }
    let context = &intent.request.context;

    let evidence_present = !context.context_set_digest.is_empty();
    if !evidence_present {
        reasons.push(reason::CONTEXT_EVIDENCE_MISSING.to_string());
    }

    let mode_matched = match constraints.required_context_evidence_mode {
        Some(required) => {
            let matched = context.context_evidence_mode == Some(required)
                || (required == EvidenceMode::BestEffort && context.context_evidence_mode.is_some());
            if !matched {
                reasons.push(reason::CONTEXT_EVIDENCE_MODE_MISMATCH.to_string());
            }
            matched
        }
        None => true,
    };

    let fresh = match (constraints.max_context_age_seconds, context.context_age_seconds) {
        (Some(max_age), Some(age)) => {
            let fresh = age <= max_age;
            if !fresh {
                reasons.push(reason::CONTEXT_FRESHNESS_EXCEEDED.to_string());
            }
            fresh
        }
        (Some(_), None) => {
            // A configured age bound with no age measurement fails closed.
            reasons.push(reason::CONTEXT_FRESHNESS_EXCEEDED.to_string());
            false
        }
        (None, _) => true,
    };

    Some(ContextConformance {
        evidence_present,
        mode_matched,
        fresh,
    })
}

// ============================================================================
// SECTION: Composed Gate
// ============================================================================

/// Options for the composed gate entry point.
#[derive(Debug, Clone, Default)]
pub struct GateOptions {
    /// Reject instead of defaulting empty context fields.
    pub strict: bool,
    /// Evaluation time (RFC3339 UTC); wall clock when absent.
    pub now: Option<String>,
    /// Shared rate-limit state file, enabling rate enforcement.
    pub rate_limit_state: Option<PathBuf>,
    /// Lock options for rate-limit state access.
    pub lock_options: Option<LockOptions>,
}

/// Outcome of the composed gate entry point.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// Gate decision.
    pub result: GateResult,
    /// Normalized intent with canonical digests.
    pub intent: NormalizedIntent,
    /// Digest of the evaluated policy.
    pub policy_digest: Digest,
}

/// Structured decision event for host telemetry exporters.
///
/// Intentionally dependency-light: hosts feed these into Prometheus or
/// OpenTelemetry without the kernel depending on a telemetry framework.
///
/// # Invariants
/// - Labels carry no argument values, only digests and stable codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecisionEvent {
    /// Tool name label.
    pub tool_name: String,
    /// Verdict label.
    pub verdict: String,
    /// Name of the rule that determined the effect, when one matched.
    pub matched_rule: Option<String>,
    /// Sorted reason codes.
    pub reason_codes: Vec<String>,
    /// Intent digest for correlation.
    pub intent_digest: String,
    /// Policy digest for correlation.
    pub policy_digest: String,
    /// Evaluation latency in milliseconds, when measured by the host.
    pub latency_ms: Option<u64>,
}

impl GateDecisionEvent {
    /// Builds a decision event from a gate outcome.
    #[must_use]
    pub fn from_outcome(outcome: &GateOutcome, latency_ms: Option<u64>) -> Self {
        Self {
            tool_name: outcome.intent.request.tool_name.clone(),
            verdict: outcome.result.verdict.as_str().to_string(),
            matched_rule: outcome.result.matched_rule.clone(),
            reason_codes: outcome.result.reason_codes.clone(),
            intent_digest: outcome.intent.intent_digest.as_str().to_string(),
            policy_digest: outcome.policy_digest.as_str().to_string(),
            latency_ms,
        }
    }
}

/// Composed gate errors.
#[derive(Debug, Error)]
pub enum GateError {
    /// Intent normalization failed.
    #[error(transparent)]
    Intent(#[from] IntentError),
    /// Policy digesting failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// Rate-limit state access failed.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
}

impl From<GateError> for gait_core::ClassifiedError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Intent(inner) => inner.into(),
            GateError::Policy(inner) => inner.into(),
            GateError::RateLimit(inner) => inner.into(),
        }
    }
}

/// Normalizes, evaluates, and applies rate limits for one intent.
///
/// Rate limits are enforced only when the decision would otherwise allow
/// execution; exhausted budgets convert the verdict to `block` with the
/// `rate_limited` reason code.
///
/// # Errors
///
/// Returns [`GateError`] for invalid intents or state-file failures;
/// rate-limit contention surfaces as a retryable error.
pub fn gate_intent(
    policy: &Policy,
    request: &IntentRequest,
    options: &GateOptions,
) -> Result<GateOutcome, GateError> {
    let intent = normalize_intent(request, options.strict)?;
    let now = options.now.clone().unwrap_or_else(timestamp::now_rfc3339);
    let mut result = evaluate_policy(policy, &intent, &now);

    if result.verdict == Verdict::Allow
        && let Some(rule_name) = &result.matched_rule
        && let Some(rule) = policy.rules.iter().find(|rule| &rule.name == rule_name)
        && let Some(spec) = rule.constraints.rate_limit
        && let Some(state_path) = &options.rate_limit_state
    {
        let lock_options =
            options.lock_options.unwrap_or_else(|| LockProfile::from_env().options());
        let decision =
            enforce_rate_limit(state_path, &spec, &intent.request, &now, &lock_options)?;
        if !decision.allowed {
            result.verdict = Verdict::Block;
            result.reason_codes.push(reason::RATE_LIMITED.to_string());
            result.reason_codes.sort();
            result.reason_codes.dedup();
        }
        result.rate_limit = Some(decision);
    }

    Ok(GateOutcome {
        result,
        intent,
        policy_digest: policy_digest(policy)?,
    })
}
