// crates/gait-gate/tests/policy.rs
// ============================================================================
// Module: Policy Parsing Tests
// Description: Verifies policy parse, normalization, and digest stability.
// ============================================================================
//! ## Overview
//! Policies must parse from YAML and JSON, normalize match sets to a
//! canonical form, and digest identically across equivalent spellings.

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

use gait_gate::PolicyError;
use gait_gate::Verdict;
use gait_gate::parse_policy;
use gait_gate::policy_digest;

#[test]
fn parses_yaml_policy() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: blocked_external
    priority: 10
    effect: block
    match:
      tool_names: ["tool.write"]
      target_values: ["api.external.com"]
"#,
    )
    .expect("parse yaml");
    assert_eq!(policy.default_verdict, Verdict::Allow);
    assert_eq!(policy.rules.len(), 1);
    assert_eq!(policy.rules[0].name, "blocked_external");
}

#[test]
fn parses_json_policy() {
    let policy = parse_policy(
        r#"{
  "default_verdict": "block",
  "rules": [
    {"name": "allow_reads", "priority": 1, "effect": "allow",
     "match": {"tool_names": ["tool.read"]}}
  ]
}"#,
    )
    .expect("parse json");
    assert_eq!(policy.default_verdict, Verdict::Block);
    assert_eq!(policy.rules[0].effect, Verdict::Allow);
}

#[test]
fn match_sets_normalize_to_lowercase_sorted_dedup() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: normalize_me
    priority: 1
    effect: block
    match:
      tool_names: ["Tool.B", "tool.a", "TOOL.B", "  tool.c  "]
"#,
    )
    .expect("parse");
    assert_eq!(policy.rules[0].matcher.tool_names, vec!["tool.a", "tool.b", "tool.c"]);
}

#[test]
fn rules_sort_by_priority_then_name() {
    let policy = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: zeta
    priority: 5
    effect: block
  - name: alpha
    priority: 5
    effect: block
  - name: first
    priority: 1
    effect: allow
"#,
    )
    .expect("parse");
    let names: Vec<_> = policy.rules.iter().map(|rule| rule.name.as_str()).collect();
    assert_eq!(names, vec!["first", "alpha", "zeta"]);
}

#[test]
fn duplicate_rule_names_are_rejected() {
    let err = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: dup
    priority: 1
    effect: block
  - name: dup
    priority: 2
    effect: allow
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PolicyError::DuplicateRule { .. }));
}

#[test]
fn equivalent_spellings_digest_equally() {
    let first = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: r1
    priority: 1
    effect: block
    match:
      tool_names: ["B.tool", "a.tool"]
"#,
    )
    .expect("parse first");
    let second = parse_policy(
        r#"
default_verdict: allow
rules:
  - name: r1
    priority: 1
    effect: block
    match:
      tool_names: ["a.tool", "b.tool", "A.TOOL"]
"#,
    )
    .expect("parse second");

    let first_digest = policy_digest(&first).expect("digest first");
    let second_digest = policy_digest(&second).expect("digest second");
    assert_eq!(first_digest, second_digest);
}

#[test]
fn rule_changes_move_the_digest() {
    let base = parse_policy("default_verdict: allow\nrules: []\n").expect("parse base");
    let changed = parse_policy("default_verdict: block\nrules: []\n").expect("parse changed");
    assert_ne!(
        policy_digest(&base).expect("digest base"),
        policy_digest(&changed).expect("digest changed")
    );
}
