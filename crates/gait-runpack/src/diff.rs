// crates/gait-runpack/src/diff.rs
// ============================================================================
// Module: Runpack Diff
// Description: Structural comparison of two runpacks.
// Purpose: Surface exactly which streams and files drifted between captures.
// Dependencies: crate::model, gait-context, gait-core, serde
// ============================================================================

//! ## Overview
//! The diff compares two runpacks structurally: manifest digests, the
//! canonical intent and result streams, the context references, and the
//! per-file hash index. Output ordering is stable, so identical inputs
//! render identical bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use gait_context::classify_refs_drift;
use gait_core::hashing::digest_canonical_json;

use crate::model::Runpack;
use crate::model::RunpackError;

// ============================================================================
// SECTION: Diff Report
// ============================================================================

/// Structural diff between two runpacks.
///
/// # Invariants
/// - `files_changed` is sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunpackDiff {
    /// True when manifest digests differ.
    pub manifest_changed: bool,
    /// True when the canonical intent streams differ.
    pub intents_changed: bool,
    /// True when the canonical result streams differ.
    pub results_changed: bool,
    /// True when the context references drifted.
    pub refs_changed: bool,
    /// Declared files whose hashes differ or that exist on one side only.
    pub files_changed: Vec<String>,
}

impl RunpackDiff {
    /// Returns true when nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.manifest_changed
            && !self.intents_changed
            && !self.results_changed
            && !self.refs_changed
            && self.files_changed.is_empty()
    }
}

// ============================================================================
// SECTION: Diff
// ============================================================================

/// Computes the structural diff between two runpacks.
///
/// # Errors
///
/// Returns [`RunpackError`] when canonicalization of either side fails.
pub fn diff_runpacks(left: &Runpack, right: &Runpack) -> Result<RunpackDiff, RunpackError> {
    let manifest_changed = left.manifest.manifest_digest != right.manifest.manifest_digest;
    let intents_changed =
        digest_canonical_json(&left.intents)? != digest_canonical_json(&right.intents)?;
    let results_changed =
        digest_canonical_json(&left.results)? != digest_canonical_json(&right.results)?;
    let refs_changed = classify_refs_drift(&left.refs, &right.refs)?.changed;

    let left_files: BTreeMap<&str, &str> = left
        .manifest
        .files
        .iter()
        .map(|file| (file.path.as_str(), file.sha256.as_str()))
        .collect();
    let right_files: BTreeMap<&str, &str> = right
        .manifest
        .files
        .iter()
        .map(|file| (file.path.as_str(), file.sha256.as_str()))
        .collect();

    let mut files_changed = BTreeSet::new();
    for (path, sha) in &left_files {
        if right_files.get(path) != Some(sha) {
            files_changed.insert((*path).to_string());
        }
    }
    for path in right_files.keys() {
        if !left_files.contains_key(path) {
            files_changed.insert((*path).to_string());
        }
    }

    Ok(RunpackDiff {
        manifest_changed,
        intents_changed,
        results_changed,
        refs_changed,
        files_changed: files_changed.into_iter().collect(),
    })
}
