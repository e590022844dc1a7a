// crates/gait-regress/src/grader.rs
// ============================================================================
// Module: Regression Graders
// Description: Deterministic grader pipeline over fixture and candidate.
// Purpose: Convert captured artifacts into explicit pass/fail reasons.
// Dependencies: crate::fixture, gait-context, gait-core, gait-runpack, serde
// ============================================================================

//! ## Overview
//! Graders are a closed set of deterministic checks: schema validation,
//! expected replay exit code, structural diff with explicit tolerances, and
//! optional context conformance. Each grader renders sorted, deduplicated
//! reason codes plus a details map for CI output; the pipeline never
//! executes tool side effects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use gait_context::DriftClass;
use gait_context::EvidenceMode;
use gait_context::classify_refs_drift;
use gait_core::schema;
use gait_core::schema::ids;
use gait_runpack::Runpack;
use gait_runpack::VerifyOptions;
use gait_runpack::diff_runpacks;
use gait_runpack::replay_runpack;
use gait_runpack::verify_zip;

use crate::fixture::FixtureSpec;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Stable grader reason codes.
pub mod reason {
    /// Archive integrity verification failed.
    pub const ZIP_INTEGRITY_FAILED: &str = "zip_integrity_failed";
    /// An artifact carried an unexpected schema identifier.
    pub const SCHEMA_ID_MISMATCH: &str = "schema_id_mismatch";
    /// An artifact failed JSON Schema validation.
    pub const SCHEMA_INVALID: &str = "schema_invalid";
    /// The intent stream is empty.
    pub const INTENTS_MISSING: &str = "intents_missing";
    /// Replay reported an unexpected exit code.
    pub const UNEXPECTED_EXIT_CODE: &str = "unexpected_exit_code";
    /// Files changed outside the declared tolerance.
    pub const UNEXPECTED_DIFF: &str = "unexpected_diff";
    /// Required context evidence was absent from the candidate.
    pub const CONTEXT_EVIDENCE_MISSING: &str = "context_evidence_missing";
    /// Context drift was semantic.
    pub const CONTEXT_SEMANTIC_DRIFT: &str = "context_semantic_drift";
    /// Context drift was runtime-only and not tolerated.
    pub const CONTEXT_RUNTIME_DRIFT: &str = "context_runtime_drift";
    /// The candidate's context set digest did not match the pinned value.
    pub const CONTEXT_SET_DIGEST_MISMATCH: &str = "context_set_digest_mismatch";
}

// ============================================================================
// SECTION: Grader Surface
// ============================================================================

/// Grader outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraderStatus {
    /// Grader passed.
    Pass,
    /// Grader failed.
    Fail,
}

/// One grader's rendered result.
///
/// # Invariants
/// - `reason_codes` are sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraderResult {
    /// Grader name, prefixed with the fixture name by the runner.
    pub name: String,
    /// Outcome status.
    pub status: GraderStatus,
    /// Sorted, deduplicated reason codes.
    pub reason_codes: Vec<String>,
    /// Structured details for CI output.
    pub details: BTreeMap<String, Value>,
}

impl GraderResult {
    /// Builds a result from collected reasons and details.
    #[must_use]
    pub fn from_reasons(
        name: &str,
        mut reason_codes: Vec<String>,
        details: BTreeMap<String, Value>,
    ) -> Self {
        reason_codes.sort();
        reason_codes.dedup();
        Self {
            name: name.to_string(),
            status: if reason_codes.is_empty() { GraderStatus::Pass } else { GraderStatus::Fail },
            reason_codes,
            details,
        }
    }
}

/// Inputs shared by every grader for one fixture.
pub struct GraderContext<'a> {
    /// Fixture description.
    pub fixture: &'a FixtureSpec,
    /// Fixture directory on disk.
    pub fixture_dir: &'a Path,
    /// Frozen baseline runpack.
    pub baseline: &'a Runpack,
    /// Candidate runpack under grade.
    pub candidate: &'a Runpack,
    /// Candidate archive path on disk.
    pub candidate_path: &'a Path,
    /// True when no candidate was supplied and the baseline grades itself.
    pub candidate_is_baseline: bool,
}

/// A deterministic regression grader.
pub trait Grader {
    /// Returns the grader's stable name.
    fn name(&self) -> &'static str;

    /// Returns true when the grader is deterministic.
    fn deterministic(&self) -> bool {
        true
    }

    /// Grades one fixture.
    fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult;
}

/// Returns the default grader pipeline for a fixture.
///
/// The context-conformance grader joins only when the fixture declares
/// conformance rules.
#[must_use]
pub fn default_graders(fixture: &FixtureSpec) -> Vec<Box<dyn Grader>> {
    let mut graders: Vec<Box<dyn Grader>> = vec![
        Box::new(SchemaValidationGrader),
        Box::new(ExpectedExitCodeGrader),
        Box::new(DiffGrader),
    ];
    if fixture.context_conformance.is_some() {
        graders.push(Box::new(ContextConformanceGrader));
    }
    graders
}

// ============================================================================
// SECTION: Schema Validation Grader
// ============================================================================

/// Verifies archive integrity and schema conformance of the candidate.
struct SchemaValidationGrader;

impl Grader for SchemaValidationGrader {
    fn name(&self) -> &'static str {
        "schema_validation"
    }

    fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let mut reasons = Vec::new();
        let mut details = BTreeMap::new();

        match verify_zip(ctx.candidate_path, &VerifyOptions::default()) {
            Ok(report) if report.passed => {
                details.insert("files_checked".to_string(), json!(report.files_checked));
            }
            Ok(report) => {
                reasons.push(reason::ZIP_INTEGRITY_FAILED.to_string());
                details.insert("missing_files".to_string(), json!(report.missing_files));
                details.insert("hash_mismatches".to_string(), json!(report.hash_mismatches));
            }
            Err(err) => {
                reasons.push(reason::ZIP_INTEGRITY_FAILED.to_string());
                details.insert("error".to_string(), json!(err.to_string()));
            }
        }

        let manifest_schema_id = &ctx.candidate.manifest.header.schema_id;
        if manifest_schema_id != ids::RUNPACK_MANIFEST {
            reasons.push(reason::SCHEMA_ID_MISMATCH.to_string());
            details.insert("manifest_schema_id".to_string(), json!(manifest_schema_id));
        }
        if let Ok(value) = serde_json::to_value(&ctx.candidate.manifest)
            && let Err(err) = schema::validate_value(ids::RUNPACK_MANIFEST, &value)
        {
            reasons.push(reason::SCHEMA_INVALID.to_string());
            details.insert("manifest_schema_error".to_string(), json!(err.to_string()));
        }
        if ctx.candidate.intents.is_empty() {
            reasons.push(reason::INTENTS_MISSING.to_string());
        }

        GraderResult::from_reasons(self.name(), reasons, details)
    }
}

// ============================================================================
// SECTION: Expected Exit Code Grader
// ============================================================================

/// Replays the candidate and compares the aggregate exit code.
struct ExpectedExitCodeGrader;

impl Grader for ExpectedExitCodeGrader {
    fn name(&self) -> &'static str {
        "expected_exit_code"
    }

    fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let report = replay_runpack(ctx.candidate);
        let mut reasons = Vec::new();
        let mut details = BTreeMap::new();
        details.insert("expected".to_string(), json!(ctx.fixture.expected_replay_exit_code));
        details.insert("actual".to_string(), json!(report.exit_code));
        if report.exit_code != ctx.fixture.expected_replay_exit_code {
            reasons.push(reason::UNEXPECTED_EXIT_CODE.to_string());
        }
        GraderResult::from_reasons(self.name(), reasons, details)
    }
}

// ============================================================================
// SECTION: Diff Grader
// ============================================================================

/// Diffs fixture against candidate, honoring declared tolerances.
struct DiffGrader;

impl Grader for DiffGrader {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let mut reasons = Vec::new();
        let mut details = BTreeMap::new();
        details.insert(
            "candidate".to_string(),
            json!(if ctx.candidate_is_baseline { "baseline" } else { "candidate" }),
        );

        match diff_runpacks(ctx.baseline, ctx.candidate) {
            Ok(diff) => {
                let unexpected: Vec<String> = diff
                    .files_changed
                    .iter()
                    .filter(|path| !ctx.fixture.diff_allow_changed_files.contains(path))
                    .cloned()
                    .collect();
                details.insert("files_changed".to_string(), json!(diff.files_changed));
                details.insert("unexpected".to_string(), json!(unexpected));
                if !unexpected.is_empty() {
                    reasons.push(reason::UNEXPECTED_DIFF.to_string());
                }
            }
            Err(err) => {
                reasons.push(reason::UNEXPECTED_DIFF.to_string());
                details.insert("error".to_string(), json!(err.to_string()));
            }
        }

        GraderResult::from_reasons(self.name(), reasons, details)
    }
}

// ============================================================================
// SECTION: Context Conformance Grader
// ============================================================================

/// Classifies context drift and enforces conformance rules.
struct ContextConformanceGrader;

impl Grader for ContextConformanceGrader {
    fn name(&self) -> &'static str {
        "context_conformance"
    }

    fn grade(&self, ctx: &GraderContext<'_>) -> GraderResult {
        let mut reasons = Vec::new();
        let mut details = BTreeMap::new();
        let Some(spec) = &ctx.fixture.context_conformance else {
            return GraderResult::from_reasons(self.name(), reasons, details);
        };

        let candidate_digest = ctx.candidate.refs.context_set_digest.as_deref();
        if spec.mode == EvidenceMode::Required
            && candidate_digest.is_none_or(|digest| digest.is_empty())
        {
            reasons.push(reason::CONTEXT_EVIDENCE_MISSING.to_string());
        }

        match classify_refs_drift(&ctx.baseline.refs, &ctx.candidate.refs) {
            Ok(report) => {
                details.insert(
                    "classification".to_string(),
                    json!(report.classification.as_str()),
                );
                match report.classification {
                    DriftClass::None => {}
                    DriftClass::Semantic => {
                        reasons.push(reason::CONTEXT_SEMANTIC_DRIFT.to_string());
                    }
                    DriftClass::RuntimeOnly => {
                        if !spec.allow_runtime_drift {
                            reasons.push(reason::CONTEXT_RUNTIME_DRIFT.to_string());
                        }
                    }
                }
                if let Some(expected) = &ctx.fixture.expected_context_set_digest
                    && candidate_digest != Some(expected.as_str())
                    && report.classification != DriftClass::RuntimeOnly
                {
                    reasons.push(reason::CONTEXT_SET_DIGEST_MISMATCH.to_string());
                    details.insert("expected_digest".to_string(), json!(expected));
                    details.insert("actual_digest".to_string(), json!(candidate_digest));
                }
            }
            Err(err) => {
                reasons.push(reason::CONTEXT_SEMANTIC_DRIFT.to_string());
                details.insert("error".to_string(), json!(err.to_string()));
            }
        }

        GraderResult::from_reasons(self.name(), reasons, details)
    }
}
