// crates/gait-runpack/src/replay.rs
// ============================================================================
// Module: Runpack Replay Stub
// Description: Deterministic replay of captured intents against results.
// Purpose: Turn a captured run into a CI-comparable exit code without
// executing any tool side effects.
// Dependencies: crate::model, serde
// ============================================================================

//! ## Overview
//! Replay walks the captured intent stream and joins each intent to its
//! result by `intent_id`. No tool is invoked; the stub only renders what the
//! captured run would report. An intent without a result is a verification
//! gap and classifies as exit-code class 2. Multi-step script intents join
//! one result like any other intent; their steps live in the canonical
//! request and are not individually replayed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::model::ResultStatus;
use crate::model::Runpack;

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Replay outcome classification for one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    /// A captured result answered the intent.
    Replayed,
    /// No captured result exists for the intent.
    MissingResult,
}

/// Replay outcome for one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    /// Intent identifier.
    pub intent_id: String,
    /// Outcome classification.
    pub status: ReplayStatus,
    /// Exit code contributed by this intent.
    pub exit_code: i32,
}

/// Replay report for a whole runpack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Run identifier.
    pub run_id: String,
    /// Aggregate exit code for the replay.
    pub exit_code: i32,
    /// Per-intent outcomes in capture order.
    pub outcomes: Vec<ReplayOutcome>,
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Replays a runpack's intents against its captured results.
#[must_use]
pub fn replay_runpack(pack: &Runpack) -> ReplayReport {
    let results: BTreeMap<&str, &crate::model::ResultEntry> =
        pack.results.iter().map(|result| (result.intent_id.as_str(), result)).collect();

    let mut outcomes = Vec::with_capacity(pack.intents.len());
    let mut aggregate = 0i32;
    for intent in &pack.intents {
        let outcome = match results.get(intent.intent_id.as_str()) {
            Some(result) => {
                let exit_code = result.exit_code.unwrap_or(match result.status {
                    ResultStatus::Ok => 0,
                    ResultStatus::Error => 1,
                });
                ReplayOutcome {
                    intent_id: intent.intent_id.clone(),
                    status: ReplayStatus::Replayed,
                    exit_code,
                }
            }
            None => ReplayOutcome {
                intent_id: intent.intent_id.clone(),
                status: ReplayStatus::MissingResult,
                exit_code: 2,
            },
        };
        aggregate = aggregate.max(outcome.exit_code);
        outcomes.push(outcome);
    }

    ReplayReport {
        run_id: pack.run.run_id.clone(),
        exit_code: aggregate,
        outcomes,
    }
}
