// crates/gait-regress/src/runner.rs
// ============================================================================
// Module: Regression Runner
// Description: Fixture loading and grader pipeline execution.
// Purpose: Aggregate grader outcomes into one deterministic verdict.
// Dependencies: crate::{fixture, grader}, gait-core, gait-runpack, serde
// ============================================================================

//! ## Overview
//! The runner loads the root manifest, reads each fixture's baseline and
//! candidate runpacks, executes the grader pipeline, and renders one
//! `RegressResult` with grader results sorted by name. Only deterministic
//! graders run unless the configuration explicitly allows otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use gait_context::ContextError;
use gait_core::fsx::FsxError;
use gait_core::hashing::HashError;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_runpack::RunpackError;
use gait_runpack::read_runpack;

use crate::fixture;
use crate::fixture::FixtureSpec;
use crate::grader::GraderContext;
use crate::grader::GraderResult;
use crate::grader::GraderStatus;
use crate::grader::default_graders;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Regression run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Working directory holding `gait.yaml` and `fixtures/`.
    pub work_dir: PathBuf,
    /// Fixture set label used in reports and JUnit suite names.
    pub fixture_set: String,
    /// Permit nondeterministic graders in the pipeline.
    pub allow_nondeterministic: bool,
}

impl RunConfig {
    /// Creates a configuration for a working directory.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            fixture_set: "default".to_string(),
            allow_nondeterministic: false,
        }
    }
}

// ============================================================================
// SECTION: Result Model
// ============================================================================

/// Aggregate regression status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressStatus {
    /// Every grader passed.
    Pass,
    /// At least one grader failed.
    Fail,
}

/// Aggregate regression result.
///
/// # Invariants
/// - `graders` are sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressResult {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Aggregate status.
    pub status: RegressStatus,
    /// Fixture set label.
    pub fixture_set: String,
    /// Grader results sorted by name.
    pub graders: Vec<GraderResult>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Regression engine errors.
#[derive(Debug, Error)]
pub enum RegressError {
    /// Runpack read or verification failure.
    #[error(transparent)]
    Runpack(#[from] RunpackError),
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(#[from] FsxError),
    /// Context normalization failure.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Canonicalization failure.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Filesystem operation failed.
    #[error("regress io failure at {path}: {reason}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Failure description.
        reason: String,
    },
    /// Manifest or fixture content failed to parse.
    #[error("regress parse error at {path}: {reason}")]
    Parse {
        /// Offending file path.
        path: PathBuf,
        /// Parse failure description.
        reason: String,
    },
    /// Serialization of a regress artifact failed.
    #[error("regress serialize error: {0}")]
    Serialize(String),
    /// Source runpack failed verification during fixture init.
    #[error("source runpack failed verification: {path}")]
    SourceNotVerified {
        /// Rejected source path.
        path: PathBuf,
    },
}

impl From<RegressError> for gait_core::ClassifiedError {
    fn from(err: RegressError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            RegressError::Runpack(inner) => inner.into(),
            RegressError::Fsx(inner) => inner.into(),
            RegressError::Context(inner) => inner.into(),
            RegressError::Hash(inner) => inner.into(),
            other => {
                let (category, code) = match &other {
                    RegressError::Io { .. } => (ErrorCategory::IoFailure, "io_failure"),
                    RegressError::Parse { .. } | RegressError::Serialize(_) => {
                        (ErrorCategory::InvalidInput, "regress_invalid")
                    }
                    RegressError::SourceNotVerified { .. } => {
                        (ErrorCategory::VerificationFailed, "source_not_verified")
                    }
                    _ => (ErrorCategory::InternalFailure, "internal_failure"),
                };
                Self::new(category, code, other.to_string()).with_cause(other)
            }
        }
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Runs the grader pipeline over every fixture in the manifest.
///
/// # Errors
///
/// Returns [`RegressError`] when fixtures cannot be loaded; grading
/// findings are reported in the returned [`RegressResult`].
pub fn run(config: &RunConfig) -> Result<RegressResult, RegressError> {
    let manifest = fixture::load_manifest(&config.work_dir)?;
    let mut graders: Vec<GraderResult> = Vec::new();

    for name in &manifest.fixtures {
        let (spec, fixture_dir) = fixture::load_fixture_spec(&config.work_dir, name)?;
        let results = grade_fixture(config, &spec, &fixture_dir)?;
        graders.extend(results);
    }

    graders.sort_by(|left, right| left.name.cmp(&right.name));
    let status = if graders.iter().all(|grader| grader.status == GraderStatus::Pass) {
        RegressStatus::Pass
    } else {
        RegressStatus::Fail
    };

    Ok(RegressResult {
        header: ArtifactHeader::new(ids::REGRESS_RESULT),
        status,
        fixture_set: config.fixture_set.clone(),
        graders,
    })
}

/// Grades one fixture with the default pipeline.
fn grade_fixture(
    config: &RunConfig,
    spec: &FixtureSpec,
    fixture_dir: &Path,
) -> Result<Vec<GraderResult>, RegressError> {
    let baseline_path = fixture_dir.join(&spec.runpack);
    let baseline = read_runpack(&baseline_path)?;

    let (candidate, candidate_path, candidate_is_baseline) = match &spec.candidate_runpack {
        Some(relative) => {
            let path = fixture_dir.join(relative);
            (read_runpack(&path)?, path, false)
        }
        None => (baseline.clone(), baseline_path.clone(), true),
    };

    let ctx = GraderContext {
        fixture: spec,
        fixture_dir,
        baseline: &baseline,
        candidate: &candidate,
        candidate_path: &candidate_path,
        candidate_is_baseline,
    };

    let pipeline = default_graders(spec);
    let mut results = Vec::new();
    for grader in pipeline {
        if !config.allow_nondeterministic && !grader.deterministic() {
            continue;
        }
        let mut result = grader.grade(&ctx);
        result.name = format!("{}/{}", spec.name, result.name);
        results.push(result);
    }
    Ok(results)
}
