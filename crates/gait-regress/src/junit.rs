// crates/gait-regress/src/junit.rs
// ============================================================================
// Module: JUnit Emission
// Description: Stable JUnit XML rendering of regression results.
// Purpose: Let CI systems consume regress verdicts without custom parsing.
// Dependencies: crate::{grader, runner}
// ============================================================================

//! ## Overview
//! JUnit emission is byte stable: grader results are already sorted, the
//! suite name is `gait.regress.<fixture_set>`, failures carry the joined
//! reason codes, and details render inside `system-out` for CI debugging.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as FmtWrite;

use crate::grader::GraderStatus;
use crate::runner::RegressResult;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a regression result as stable JUnit XML bytes.
#[must_use]
pub fn render_junit(result: &RegressResult) -> Vec<u8> {
    let suite = format!("gait.regress.{}", result.fixture_set);
    let failures =
        result.graders.iter().filter(|grader| grader.status == GraderStatus::Fail).count();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuite name=\"{}\" tests=\"{}\" failures=\"{failures}\">",
        escape(&suite),
        result.graders.len()
    );

    for grader in &result.graders {
        let _ = write!(
            xml,
            "  <testcase name=\"{}\" classname=\"{}\"",
            escape(&grader.name),
            escape(&suite)
        );
        let details = serde_json::to_string(&grader.details).unwrap_or_else(|_| "{}".to_string());
        if grader.status == GraderStatus::Fail {
            xml.push_str(">\n");
            let _ = writeln!(
                xml,
                "    <failure message=\"{}\"/>",
                escape(&grader.reason_codes.join(","))
            );
            let _ = writeln!(xml, "    <system-out>{}</system-out>", escape(&details));
            xml.push_str("  </testcase>\n");
        } else {
            xml.push_str(">\n");
            let _ = writeln!(xml, "    <system-out>{}</system-out>", escape(&details));
            xml.push_str("  </testcase>\n");
        }
    }

    xml.push_str("</testsuite>\n");
    xml.into_bytes()
}

/// Escapes text for XML attribute and element content.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
