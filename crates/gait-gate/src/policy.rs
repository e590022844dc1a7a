// crates/gait-gate/src/policy.rs
// ============================================================================
// Module: Gate Policy Model
// Description: Policy rule set parsing, normalization, and digesting.
// Purpose: Give every policy a deterministic canonical form and digest.
// Dependencies: gait-context, gait-core, serde, serde_yaml
// ============================================================================

//! ## Overview
//! A policy is an ordered rule set with a default verdict. Rules carry match
//! sets and optional constraints; match sets normalize to lowercase,
//! deduplicated, sorted form so `policy_digest` is stable across equivalent
//! spellings. Policies parse from YAML or JSON text (JSON is a YAML subset).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use gait_context::EvidenceMode;
use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Gate verdict for an evaluated intent.
///
/// # Invariants
/// - Variants are stable for serialization and exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The caller may execute the intent.
    Allow,
    /// The caller must not execute the intent.
    Block,
    /// Execution needs an explicit approval first.
    RequireApproval,
    /// Evaluate and trace, but execute nothing.
    DryRun,
}

impl Verdict {
    /// Returns the stable wire label for the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
            Self::RequireApproval => "require_approval",
            Self::DryRun => "dry_run",
        }
    }

    /// Returns the process exit code for the verdict.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Allow => 0,
            Self::Block => 3,
            Self::RequireApproval => 4,
            Self::DryRun => 5,
        }
    }
}

// ============================================================================
// SECTION: Rate Limit Specification
// ============================================================================

/// Bucket scope for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// One bucket per tool and identity pair.
    ToolIdentity,
    /// One bucket per tool.
    Tool,
    /// One bucket per identity.
    Identity,
    /// A single global bucket.
    Global,
}

/// Window length for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    /// Sixty-second window.
    Minute,
    /// Sixty-minute window.
    Hour,
    /// Twenty-four-hour window.
    Day,
}

/// Rate limit attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Requests permitted per window.
    pub requests: u64,
    /// Window length.
    pub window: RateWindow,
    /// Bucket scope.
    pub scope: RateScope,
}

// ============================================================================
// SECTION: Rule Model
// ============================================================================

/// Match sets selecting which intents a rule applies to.
///
/// Empty sets match everything; non-empty sets require membership.
///
/// # Invariants
/// - After normalization every set is lowercase, deduplicated, and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Tool names the rule applies to.
    #[serde(default)]
    pub tool_names: Vec<String>,
    /// Target kinds (`path`, `host`, `url`, `other`).
    #[serde(default)]
    pub target_kinds: Vec<String>,
    /// Exact target values.
    #[serde(default)]
    pub target_values: Vec<String>,
    /// Risk classes (`low`, `medium`, `high`, `critical`).
    #[serde(default)]
    pub risk_classes: Vec<String>,
    /// Endpoint classes (`fs.read`, `net.http`, ...).
    #[serde(default)]
    pub endpoint_classes: Vec<String>,
    /// Context classes matched against the intent's auth context.
    #[serde(default)]
    pub context_classes: Vec<String>,
}

/// Policy applied when a matched intent is destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructiveActionPolicy {
    /// Destructive actions are blocked.
    Forbid,
    /// Destructive actions require approval.
    RequireApproval,
}

/// Delegation requirements attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequirement {
    /// Maximum accepted delegation chain depth.
    pub max_depth: u64,
}

/// Constraints checked after a rule matches.
///
/// Violated constraints convert an `allow` effect into `block` or
/// `require_approval`; they never relax a stricter effect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleConstraints {
    /// Path prefixes execution is confined to.
    #[serde(default)]
    pub path_allowlist: Vec<String>,
    /// Path prefixes that are always violations.
    #[serde(default)]
    pub path_denylist: Vec<String>,
    /// Domains egress is confined to.
    #[serde(default)]
    pub domain_allowlist: Vec<String>,
    /// Domains that are always violations.
    #[serde(default)]
    pub domain_denylist: Vec<String>,
    /// Endpoint classes network egress is confined to.
    #[serde(default)]
    pub egress_classes: Vec<String>,
    /// Handling of destructive operations.
    #[serde(default)]
    pub destructive_action: Option<DestructiveActionPolicy>,
    /// Rate limit enforced for matching intents.
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
    /// Require context evidence to be present.
    #[serde(default)]
    pub require_context_evidence: bool,
    /// Require a specific context evidence mode.
    #[serde(default)]
    pub required_context_evidence_mode: Option<EvidenceMode>,
    /// Maximum accepted context age in seconds.
    #[serde(default)]
    pub max_context_age_seconds: Option<u64>,
    /// Delegation requirements for matching intents.
    #[serde(default)]
    pub require_delegation: Option<DelegationRequirement>,
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name, used as the reason code for non-allow effects.
    pub name: String,
    /// Evaluation priority; lower numbers evaluate first.
    pub priority: i64,
    /// Effect when the rule matches.
    pub effect: Verdict,
    /// Match sets selecting intents.
    #[serde(default, rename = "match")]
    pub matcher: RuleMatch,
    /// Constraints checked after matching.
    #[serde(default)]
    pub constraints: RuleConstraints,
}

/// An ordered policy rule set.
///
/// # Invariants
/// - Rules are sorted by `(priority, name)` after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Verdict applied when no rule matches.
    pub default_verdict: Verdict,
    /// Ordered rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy parsing and digesting errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy text failed to parse as YAML or JSON.
    #[error("policy parse error: {0}")]
    Parse(String),
    /// Two rules share the same name.
    #[error("duplicate rule name: {name}")]
    DuplicateRule {
        /// Duplicated rule name.
        name: String,
    },
    /// A rule carries an empty name.
    #[error("rule names must be non-empty")]
    EmptyRuleName,
    /// Canonicalization or digesting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<PolicyError> for gait_core::ClassifiedError {
    fn from(err: PolicyError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            PolicyError::Hash(inner) => inner.into(),
            other => Self::new(ErrorCategory::InvalidInput, "policy_invalid", other.to_string())
                .with_cause(other),
        }
    }
}

// ============================================================================
// SECTION: Parse and Normalize
// ============================================================================

/// Parses a policy from YAML or JSON text and normalizes it.
///
/// # Errors
///
/// Returns [`PolicyError`] for malformed text or invalid rule sets.
pub fn parse_policy(text: &str) -> Result<Policy, PolicyError> {
    let mut policy: Policy =
        serde_yaml::from_str(text).map_err(|err| PolicyError::Parse(err.to_string()))?;
    normalize_policy(&mut policy)?;
    Ok(policy)
}

/// Normalizes match sets and rule ordering in place.
///
/// # Errors
///
/// Returns [`PolicyError`] for empty or duplicated rule names.
pub fn normalize_policy(policy: &mut Policy) -> Result<(), PolicyError> {
    let mut seen = std::collections::BTreeSet::new();
    for rule in &mut policy.rules {
        rule.name = rule.name.trim().to_string();
        if rule.name.is_empty() {
            return Err(PolicyError::EmptyRuleName);
        }
        if !seen.insert(rule.name.clone()) {
            return Err(PolicyError::DuplicateRule {
                name: rule.name.clone(),
            });
        }
        normalize_set(&mut rule.matcher.tool_names);
        normalize_set(&mut rule.matcher.target_kinds);
        normalize_set(&mut rule.matcher.target_values);
        normalize_set(&mut rule.matcher.risk_classes);
        normalize_set(&mut rule.matcher.endpoint_classes);
        normalize_set(&mut rule.matcher.context_classes);
        normalize_set(&mut rule.constraints.egress_classes);
        normalize_set(&mut rule.constraints.domain_allowlist);
        normalize_set(&mut rule.constraints.domain_denylist);
    }
    policy.rules.sort_by(|left, right| {
        (left.priority, &left.name).cmp(&(right.priority, &right.name))
    });
    Ok(())
}

/// Lowercases, trims, deduplicates, and sorts a match set.
fn normalize_set(set: &mut Vec<String>) {
    for value in set.iter_mut() {
        *value = value.trim().to_ascii_lowercase();
    }
    set.retain(|value| !value.is_empty());
    set.sort();
    set.dedup();
}

// ============================================================================
// SECTION: Digest
// ============================================================================

/// Computes the deterministic policy digest.
///
/// The digest pins the artifact header to the deterministic epoch so equal
/// rule sets hash equally regardless of when they were loaded.
///
/// # Errors
///
/// Returns [`PolicyError::Hash`] when canonicalization fails.
pub fn policy_digest(policy: &Policy) -> Result<Digest, PolicyError> {
    let mut pinned = policy.clone();
    pinned.header = ArtifactHeader::deterministic(ids::GATE_POLICY);
    Ok(digest_canonical_json(&pinned)?)
}
