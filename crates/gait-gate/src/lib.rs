// crates/gait-gate/src/lib.rs
// ============================================================================
// Module: Gait Gate Library
// Description: Policy evaluation and enforcement at the tool-call boundary.
// Purpose: Render deterministic verdicts and signed traces for agent intents.
// Dependencies: crate::{delegation, endpoint, eval, intent, policy, ratelimit, trace}
// ============================================================================

//! ## Overview
//! The gate normalizes an intent request, evaluates it against an ordered
//! policy rule set, applies rate limits through a shared state file, and
//! emits a signed trace record binding `intent_digest`, `policy_digest`,
//! and the verdict. Non-`allow` verdicts and verification failures never
//! execute side effects; the gate only renders decisions and evidence.
//!
//! Evaluation is deterministic: equal inputs produce equal outputs,
//! including reason-code ordering.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod delegation;
pub mod endpoint;
pub mod eval;
pub mod intent;
pub mod policy;
pub mod ratelimit;
pub mod trace;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use delegation::DelegationChain;
pub use delegation::DelegationError;
pub use delegation::DelegationLink;
pub use delegation::sign_delegation_link;
pub use delegation::verify_delegation;
pub use endpoint::EndpointClass;
pub use endpoint::classify_endpoint;
pub use eval::ContextConformance;
pub use eval::GateDecisionEvent;
pub use eval::GateError;
pub use eval::GateOptions;
pub use eval::GateOutcome;
pub use eval::GateResult;
pub use eval::evaluate_policy;
pub use eval::gate_intent;
pub use eval::reason;
pub use intent::ArgProvenance;
pub use intent::IntentContext;
pub use intent::IntentError;
pub use intent::IntentRequest;
pub use intent::NormalizedIntent;
pub use intent::RiskClass;
pub use intent::Script;
pub use intent::ScriptStep;
pub use intent::Target;
pub use intent::TargetKind;
pub use intent::normalize_intent;
pub use policy::DelegationRequirement;
pub use policy::DestructiveActionPolicy;
pub use policy::Policy;
pub use policy::PolicyError;
pub use policy::PolicyRule;
pub use policy::RateLimitSpec;
pub use policy::RateScope;
pub use policy::RateWindow;
pub use policy::RuleConstraints;
pub use policy::RuleMatch;
pub use policy::Verdict;
pub use policy::parse_policy;
pub use policy::policy_digest;
pub use ratelimit::RateLimitDecision;
pub use ratelimit::RateLimitError;
pub use ratelimit::enforce_rate_limit;
pub use trace::TraceEmission;
pub use trace::TraceError;
pub use trace::TraceRecord;
pub use trace::emit_signed_trace;
pub use trace::verify_trace_record;
