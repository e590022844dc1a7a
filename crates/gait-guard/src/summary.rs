// crates/gait-guard/src/summary.rs
// ============================================================================
// Module: Evidence Summaries
// Description: Summary artifacts derived from runpack, trace, and regress.
// Purpose: Give auditors one-page views without re-reading raw artifacts.
// Dependencies: gait-core, gait-gate, gait-regress, gait-runpack, serde
// ============================================================================

//! ## Overview
//! Summaries condense the evidence a pack bundles: the runpack's identity
//! and verification state, each trace's decision line, and the regression
//! verdict. They are derived artifacts; the digests inside them chain back
//! to the originals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use gait_gate::TraceRecord;
use gait_regress::RegressResult;
use gait_regress::grader::GraderStatus;
use gait_runpack::Runpack;
use gait_runpack::VerifyReport;

// ============================================================================
// SECTION: Runpack Summary
// ============================================================================

/// Condensed view of one runpack (`runpack_summary.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunpackSummary {
    /// Run identifier.
    pub run_id: String,
    /// Manifest digest of the runpack.
    pub manifest_digest: String,
    /// Count of declared files verified.
    pub files_checked: usize,
    /// Captured intent count.
    pub intent_count: usize,
    /// Captured result count.
    pub result_count: usize,
    /// Context set digest carried by the run, when present.
    pub context_set_digest: Option<String>,
    /// True when runpack verification passed.
    pub verified: bool,
}

impl RunpackSummary {
    /// Builds a summary from a read runpack and its verify report.
    #[must_use]
    pub fn from_pack(pack: &Runpack, report: &VerifyReport) -> Self {
        Self {
            run_id: pack.run.run_id.clone(),
            manifest_digest: pack.manifest.manifest_digest.clone(),
            files_checked: report.files_checked,
            intent_count: pack.intents.len(),
            result_count: pack.results.len(),
            context_set_digest: pack.refs.context_set_digest.clone(),
            verified: report.passed,
        }
    }
}

// ============================================================================
// SECTION: Trace Summary
// ============================================================================

/// One trace's decision line inside the trace summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLine {
    /// Trace identifier.
    pub trace_id: String,
    /// Tool name the intent targeted.
    pub tool_name: String,
    /// Verdict label.
    pub verdict: String,
    /// Intent digest the trace binds.
    pub intent_digest: String,
    /// Policy digest the trace binds.
    pub policy_digest: String,
    /// Count of attached signatures.
    pub signature_count: usize,
}

/// Condensed view of emitted traces (`trace_summary.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Count of traces summarized.
    pub trace_count: usize,
    /// Decision lines, sorted by trace identifier.
    pub traces: Vec<TraceLine>,
}

impl TraceSummary {
    /// Builds a summary from parsed trace records.
    #[must_use]
    pub fn from_records(records: &[TraceRecord]) -> Self {
        let mut traces: Vec<TraceLine> = records
            .iter()
            .map(|record| TraceLine {
                trace_id: record.trace_id.clone(),
                tool_name: record.tool_name.clone(),
                verdict: record.verdict.as_str().to_string(),
                intent_digest: record.intent_digest.clone(),
                policy_digest: record.policy_digest.clone(),
                signature_count: record.signatures.len(),
            })
            .collect();
        traces.sort_by(|left, right| left.trace_id.cmp(&right.trace_id));
        Self {
            trace_count: traces.len(),
            traces,
        }
    }
}

// ============================================================================
// SECTION: Regress Summary
// ============================================================================

/// Condensed view of a regression run (`regress_summary.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressSummary {
    /// Aggregate status label.
    pub status: String,
    /// Fixture set label.
    pub fixture_set: String,
    /// Count of graders executed.
    pub grader_count: usize,
    /// Names of graders that failed, sorted.
    pub failed_graders: Vec<String>,
}

impl RegressSummary {
    /// Builds a summary from a regression result.
    #[must_use]
    pub fn from_result(result: &RegressResult) -> Self {
        let mut failed_graders: Vec<String> = result
            .graders
            .iter()
            .filter(|grader| grader.status == GraderStatus::Fail)
            .map(|grader| grader.name.clone())
            .collect();
        failed_graders.sort();
        Self {
            status: match result.status {
                gait_regress::RegressStatus::Pass => "pass".to_string(),
                gait_regress::RegressStatus::Fail => "fail".to_string(),
            },
            fixture_set: result.fixture_set.clone(),
            grader_count: result.graders.len(),
            failed_graders,
        }
    }
}
