// crates/gait-gate/tests/gate.rs
// ============================================================================
// Module: Gate Evaluation Tests
// Description: Verifies normalization, matching, and fail-closed behavior.
// ============================================================================
//! ## Overview
//! Covers the literal gate scenarios: blocking an external host, failing
//! closed on missing context evidence, endpoint classification, constraint
//! escalation, delegation enforcement, and evaluation determinism.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::KeyPair;
use gait_gate::DelegationChain;
use gait_gate::DelegationLink;
use gait_gate::EndpointClass;
use gait_gate::IntentContext;
use gait_gate::IntentRequest;
use gait_gate::RiskClass;
use gait_gate::Script;
use gait_gate::ScriptStep;
use gait_gate::Target;
use gait_gate::TargetKind;
use gait_gate::Verdict;
use gait_gate::classify_endpoint;
use gait_gate::evaluate_policy;
use gait_gate::normalize_intent;
use gait_gate::parse_policy;
use gait_gate::reason;
use gait_gate::sign_delegation_link;

/// Fixed evaluation time for deterministic tests.
const NOW: &str = "2026-03-01T12:00:00Z";

/// Builds a minimal intent request.
fn intent(tool: &str) -> IntentRequest {
    IntentRequest {
        header: ArtifactHeader::deterministic(ids::GATE_INTENT_REQUEST),
        tool_name: tool.to_string(),
        args: Some(serde_json::json!({})),
        targets: Vec::new(),
        target: None,
        arg_provenance: Vec::new(),
        context: IntentContext::default(),
        delegation: None,
        script: None,
    }
}

/// Adds a target to an intent.
fn with_target(mut request: IntentRequest, kind: TargetKind, value: &str, op: &str) -> IntentRequest {
    request.targets.push(Target {
        kind,
        value: value.to_string(),
        operation: op.to_string(),
        sensitivity: String::new(),
    });
    request
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

#[test]
fn normalization_defaults_identity_and_workspace() {
    let normalized = normalize_intent(&intent("tool.read"), false).expect("normalize");
    assert_eq!(normalized.request.context.identity, "anonymous");
    assert_eq!(normalized.request.context.workspace, "local");
    assert_eq!(normalized.request.context.risk_class, RiskClass::Low);
}

#[test]
fn strict_mode_rejects_empty_identity() {
    assert!(normalize_intent(&intent("tool.read"), true).is_err());
}

#[test]
fn legacy_target_infers_kind() {
    let mut url = intent("tool.fetch");
    url.target = Some("https://api.example.com/v1".to_string());
    let normalized = normalize_intent(&url, false).expect("normalize url");
    assert_eq!(normalized.request.targets[0].kind, TargetKind::Url);

    let mut path = intent("tool.read");
    path.target = Some("/tmp/out.txt".to_string());
    let normalized = normalize_intent(&path, false).expect("normalize path");
    assert_eq!(normalized.request.targets[0].kind, TargetKind::Path);

    let mut host = intent("tool.ping");
    host.target = Some("api.example.com".to_string());
    let normalized = normalize_intent(&host, false).expect("normalize host");
    assert_eq!(normalized.request.targets[0].kind, TargetKind::Host);
}

#[test]
fn intent_digest_is_stable_across_captures() {
    let first = normalize_intent(&intent("tool.read"), false).expect("first");
    let mut later = intent("tool.read");
    later.header = ArtifactHeader::new(ids::GATE_INTENT_REQUEST);
    let second = normalize_intent(&later, false).expect("second");
    assert_eq!(first.intent_digest, second.intent_digest);
    assert_eq!(first.args_digest, second.args_digest);
}

#[test]
fn script_steps_move_the_intent_digest() {
    let plain = normalize_intent(&intent("tool.batch"), false).expect("plain");

    let mut scripted = intent("tool.batch");
    scripted.script = Some(Script {
        steps: vec![
            ScriptStep {
                tool_name: "tool.read".to_string(),
                args: Some(serde_json::json!({"path": "/tmp/a"})),
            },
            ScriptStep {
                tool_name: "tool.write".to_string(),
                args: Some(serde_json::json!({"path": "/tmp/b"})),
            },
        ],
    });
    let scripted = normalize_intent(&scripted, false).expect("scripted");

    assert_ne!(
        plain.intent_digest, scripted.intent_digest,
        "a changed script is a changed intent"
    );

    let mut reordered = scripted.request.clone();
    if let Some(script) = &mut reordered.script {
        script.steps.reverse();
    }
    let reordered = normalize_intent(&reordered, false).expect("reordered");
    assert_ne!(
        scripted.intent_digest, reordered.intent_digest,
        "step order is part of the canonical intent"
    );
}

#[test]
fn script_steps_with_empty_tool_names_are_rejected() {
    let mut request = intent("tool.batch");
    request.script = Some(Script {
        steps: vec![ScriptStep {
            tool_name: "   ".to_string(),
            args: None,
        }],
    });
    assert!(normalize_intent(&request, false).is_err());
}

// ============================================================================
// SECTION: Endpoint Classification
// ============================================================================

#[test]
fn endpoint_classification_is_deterministic() {
    let path_read = Target {
        kind: TargetKind::Path,
        value: "/tmp/a".to_string(),
        operation: "read".to_string(),
        sensitivity: String::new(),
    };
    assert_eq!(classify_endpoint(&path_read), Some(EndpointClass::FsRead));

    let path_delete = Target {
        operation: "delete".to_string(),
        ..path_read.clone()
    };
    assert_eq!(classify_endpoint(&path_delete), Some(EndpointClass::FsDelete));

    let host_dns = Target {
        kind: TargetKind::Host,
        value: "example.com".to_string(),
        operation: "resolve".to_string(),
        sensitivity: String::new(),
    };
    assert_eq!(classify_endpoint(&host_dns), Some(EndpointClass::NetDns));

    let host_odd = Target {
        operation: "teleport".to_string(),
        ..host_dns
    };
    assert_eq!(classify_endpoint(&host_odd), None, "unknown pairs must not be guessed");
}

// ============================================================================
// SECTION: Scenario S1 — Gate-Block External Host
// ============================================================================

#[test]
fn blocks_external_host_with_rule_reason() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: blocked_external
    priority: 10
    effect: block
    match:
      tool_names: ["tool.write"]
      target_kinds: ["host"]
      target_values: ["api.external.com"]
"#,
    )
    .expect("parse");

    let mut request = intent("tool.write");
    request.args = Some(serde_json::json!({"path": "/tmp/out.txt"}));
    request = with_target(request, TargetKind::Host, "api.external.com", "");
    request.context.identity = "alice".to_string();
    request.context.workspace = "/repo/gait".to_string();
    request.context.risk_class = RiskClass::High;

    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == "blocked_external"));
    assert_eq!(result.matched_rule.as_deref(), Some("blocked_external"));
}

// ============================================================================
// SECTION: Scenario S2 — Context Evidence Missing
// ============================================================================

#[test]
fn missing_context_evidence_blocks() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: needs_context
    priority: 1
    effect: allow
    constraints:
      require_context_evidence: true
      required_context_evidence_mode: required
"#,
    )
    .expect("parse");

    let request = intent("tool.read");
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == reason::CONTEXT_EVIDENCE_MISSING));
    let conformance = result.context_conformance.expect("conformance recorded");
    assert!(!conformance.evidence_present);
}

#[test]
fn stale_context_evidence_blocks() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: fresh_context_only
    priority: 1
    effect: allow
    constraints:
      require_context_evidence: true
      max_context_age_seconds: 60
"#,
    )
    .expect("parse");

    let mut request = intent("tool.read");
    request.context.context_set_digest = "a".repeat(64);
    request.context.context_age_seconds = Some(3600);
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == reason::CONTEXT_FRESHNESS_EXCEEDED));
}

#[test]
fn missing_age_measurement_fails_closed_under_age_bound() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: fresh_context_only
    priority: 1
    effect: allow
    constraints:
      require_context_evidence: true
      max_context_age_seconds: 60
"#,
    )
    .expect("parse");

    // Evidence digest present, but the caller omits context_age_seconds.
    let mut request = intent("tool.read");
    request.context.context_set_digest = "a".repeat(64);
    request.context.context_age_seconds = None;
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == reason::CONTEXT_FRESHNESS_EXCEEDED));
    let conformance = result.context_conformance.expect("conformance recorded");
    assert!(!conformance.fresh, "an unmeasured age must not count as fresh");
}

// ============================================================================
// SECTION: Constraints
// ============================================================================

#[test]
fn path_denylist_converts_allow_to_block() {
    let policy = parse_policy(
        r#"
default_verdict: block
rules:
  - name: writes_confined
    priority: 1
    effect: allow
    match:
      tool_names: ["tool.write"]
    constraints:
      path_denylist: ["/etc"]
"#,
    )
    .expect("parse");

    let request = with_target(intent("tool.write"), TargetKind::Path, "/etc/passwd", "write");
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.violations.iter().any(|violation| violation == reason::PATH_DENIED));
}

#[test]
fn unknown_endpoint_class_fails_closed_under_egress_constraint() {
    let policy = parse_policy(
        r#"
default_verdict: block
rules:
  - name: egress_confined
    priority: 1
    effect: allow
    match:
      tool_names: ["tool.fetch"]
    constraints:
      egress_classes: ["net.http"]
"#,
    )
    .expect("parse");

    let request = with_target(intent("tool.fetch"), TargetKind::Host, "api.example.com", "teleport");
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::Block);
    assert!(
        result
            .reason_codes
            .iter()
            .any(|code| code == reason::FAIL_CLOSED_ENDPOINT_CLASS_UNKNOWN)
    );
    assert!(result.reason_codes.iter().any(|code| code == reason::ENDPOINT_CLASS_UNKNOWN));
}

#[test]
fn destructive_action_escalates_to_approval() {
    let policy = parse_policy(
        r#"
default_verdict: block
rules:
  - name: deletes_need_approval
    priority: 1
    effect: allow
    match:
      tool_names: ["tool.fs"]
    constraints:
      destructive_action: require_approval
"#,
    )
    .expect("parse");

    let request = with_target(intent("tool.fs"), TargetKind::Path, "/tmp/scratch", "delete");
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);

    assert_eq!(result.verdict, Verdict::RequireApproval);
    assert!(result.violations.iter().any(|code| code == reason::DESTRUCTIVE_ACTION_BLOCKED));
}

#[test]
fn default_verdict_applies_when_nothing_matches() {
    let policy = parse_policy(
        r#"
default_verdict: dry_run
rules:
  - name: writes_only
    priority: 1
    effect: block
    match:
      tool_names: ["tool.write"]
"#,
    )
    .expect("parse");

    let normalized = normalize_intent(&intent("tool.read"), false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);
    assert_eq!(result.verdict, Verdict::DryRun);
    assert_eq!(result.reason_codes, vec![reason::DEFAULT_VERDICT.to_string()]);
    assert!(result.matched_rule.is_none());
}

// ============================================================================
// SECTION: Delegation
// ============================================================================

#[test]
fn missing_delegation_blocks_when_required() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: delegated_only
    priority: 1
    effect: allow
    constraints:
      require_delegation:
        max_depth: 2
"#,
    )
    .expect("parse");

    let normalized = normalize_intent(&intent("tool.read"), false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);
    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == reason::DELEGATION_MISSING));
}

#[test]
fn valid_delegation_chain_allows() {
    let delegator = KeyPair::generate();
    let link = DelegationLink {
        delegator_public_key: delegator.public_key_base64(),
        delegate: "agent_a".to_string(),
        scope: "tool.read".to_string(),
        expires_at: "2026-12-31T00:00:00Z".to_string(),
        signature: None,
    };
    let signed = sign_delegation_link(&link, &delegator).expect("sign link");
    let chain = DelegationChain {
        delegation_ref: "dele_1".to_string(),
        links: vec![signed],
    };

    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: delegated_only
    priority: 1
    effect: allow
    constraints:
      require_delegation:
        max_depth: 2
"#,
    )
    .expect("parse");

    let mut request = intent("tool.read");
    request.delegation = Some(chain);
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);
    assert_eq!(result.verdict, Verdict::Allow);
}

#[test]
fn expired_delegation_blocks() {
    let delegator = KeyPair::generate();
    let link = DelegationLink {
        delegator_public_key: delegator.public_key_base64(),
        delegate: "agent_a".to_string(),
        scope: "tool.read".to_string(),
        expires_at: "2026-01-01T00:00:00Z".to_string(),
        signature: None,
    };
    let signed = sign_delegation_link(&link, &delegator).expect("sign link");
    let chain = DelegationChain {
        delegation_ref: "dele_1".to_string(),
        links: vec![signed],
    };

    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: delegated_only
    priority: 1
    effect: allow
    constraints:
      require_delegation:
        max_depth: 2
"#,
    )
    .expect("parse");

    let mut request = intent("tool.read");
    request.delegation = Some(chain);
    let normalized = normalize_intent(&request, false).expect("normalize");
    let result = evaluate_policy(&policy, &normalized, NOW);
    assert_eq!(result.verdict, Verdict::Block);
    assert!(result.reason_codes.iter().any(|code| code == reason::DELEGATION_EXPIRED));
}

// ============================================================================
// SECTION: Determinism
// ============================================================================

#[test]
fn evaluation_is_deterministic_including_reason_order() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: guarded
    priority: 1
    effect: allow
    constraints:
      require_context_evidence: true
      required_context_evidence_mode: required
      path_denylist: ["/etc"]
"#,
    )
    .expect("parse");

    let request = with_target(intent("tool.write"), TargetKind::Path, "/etc/hosts", "write");
    let normalized = normalize_intent(&request, false).expect("normalize");

    let first = evaluate_policy(&policy, &normalized, NOW);
    let second = evaluate_policy(&policy, &normalized, NOW);
    assert_eq!(first, second, "equal inputs must produce equal outputs");

    let mut sorted_reasons = first.reason_codes.clone();
    sorted_reasons.sort();
    assert_eq!(first.reason_codes, sorted_reasons, "reason codes must be sorted");
}
