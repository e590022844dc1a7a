// crates/gait-regress/src/fixture.rs
// ============================================================================
// Module: Regression Fixtures
// Description: Fixture initialization and the root fixture manifest.
// Purpose: Freeze verified runpacks as named regression baselines.
// Dependencies: crate::runner, gait-core, gait-runpack, serde, serde_yaml
// ============================================================================

//! ## Overview
//! A fixture is a verified runpack frozen under `fixtures/<name>/` with a
//! `fixture.json` describing the expected replay exit code, diff
//! tolerances, and optional context-conformance rules. The root `gait.yaml`
//! manifest is regenerated by scanning the fixtures directory, sorted by
//! name, so it never drifts from the directory contents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use gait_context::EvidenceMode;
use gait_core::fsx;
use gait_core::hashing::canonical_json_bytes;
use gait_runpack::VerifyOptions;
use gait_runpack::read_runpack;
use gait_runpack::verify_zip;

use crate::runner::RegressError;

// ============================================================================
// SECTION: Fixture Model
// ============================================================================

/// Context-conformance rules attached to a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConformanceSpec {
    /// Evidence mode the candidate must satisfy.
    #[serde(default)]
    pub mode: EvidenceMode,
    /// Accept runtime-only drift instead of failing.
    #[serde(default)]
    pub allow_runtime_drift: bool,
}

/// One regression fixture description (`fixture.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSpec {
    /// Fixture name.
    pub name: String,
    /// Run identifier of the frozen runpack.
    pub run_id: String,
    /// Runpack file name relative to the fixture directory.
    pub runpack: String,
    /// Exit code the replay stub must report.
    #[serde(default)]
    pub expected_replay_exit_code: i32,
    /// Context-conformance rules, when graded.
    #[serde(default)]
    pub context_conformance: Option<ContextConformanceSpec>,
    /// Context set digest the candidate must carry, when pinned.
    #[serde(default)]
    pub expected_context_set_digest: Option<String>,
    /// Files allowed to differ between fixture and candidate.
    #[serde(default)]
    pub diff_allow_changed_files: Vec<String>,
    /// Candidate runpack path relative to the fixture directory; the
    /// fixture runpack itself when absent.
    #[serde(default)]
    pub candidate_runpack: Option<String>,
}

/// Root fixture manifest (`gait.yaml`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegressManifest {
    /// Fixture names, sorted.
    #[serde(default)]
    pub fixtures: Vec<String>,
}

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Frozen runpack file name inside a fixture directory.
pub const FIXTURE_RUNPACK_NAME: &str = "runpack.zip";

/// Fixture description file name.
pub const FIXTURE_SPEC_NAME: &str = "fixture.json";

/// Root manifest file name.
pub const MANIFEST_NAME: &str = "gait.yaml";

/// Initializes a fixture from a verified source runpack.
///
/// Verifies the source, copies it into `fixtures/<name>/runpack.zip`,
/// writes `fixture.json`, and regenerates the root `gait.yaml`.
///
/// # Errors
///
/// Returns [`RegressError`] when verification, copying, or manifest
/// regeneration fails.
pub fn init_fixture(
    source_runpack: &Path,
    fixture_name: &str,
    work_dir: &Path,
) -> Result<FixtureSpec, RegressError> {
    let report = verify_zip(source_runpack, &VerifyOptions::default())?;
    if !report.passed {
        return Err(RegressError::SourceNotVerified {
            path: source_runpack.to_path_buf(),
        });
    }
    let pack = read_runpack(source_runpack)?;

    let fixture_dir = work_dir.join("fixtures").join(fixture_name);
    fs::create_dir_all(&fixture_dir).map_err(|err| RegressError::Io {
        path: fixture_dir.clone(),
        reason: err.to_string(),
    })?;

    let bytes = fs::read(source_runpack).map_err(|err| RegressError::Io {
        path: source_runpack.to_path_buf(),
        reason: err.to_string(),
    })?;
    fsx::write_file_atomic(&fixture_dir.join(FIXTURE_RUNPACK_NAME), &bytes, fsx::DEFAULT_FILE_MODE)?;

    let spec = FixtureSpec {
        name: fixture_name.to_string(),
        run_id: pack.run.run_id.clone(),
        runpack: FIXTURE_RUNPACK_NAME.to_string(),
        expected_replay_exit_code: 0,
        context_conformance: None,
        expected_context_set_digest: pack.refs.context_set_digest.clone(),
        diff_allow_changed_files: Vec::new(),
        candidate_runpack: None,
    };
    write_fixture_spec(&fixture_dir, &spec)?;
    regenerate_manifest(work_dir)?;
    Ok(spec)
}

/// Writes a fixture description atomically.
///
/// # Errors
///
/// Returns [`RegressError`] when serialization or the write fails.
pub fn write_fixture_spec(fixture_dir: &Path, spec: &FixtureSpec) -> Result<(), RegressError> {
    let bytes = canonical_json_bytes(spec).map_err(|err| RegressError::Serialize(err.to_string()))?;
    fsx::write_file_atomic(&fixture_dir.join(FIXTURE_SPEC_NAME), &bytes, fsx::DEFAULT_FILE_MODE)?;
    Ok(())
}

/// Regenerates `gait.yaml` by scanning the fixtures directory.
///
/// # Errors
///
/// Returns [`RegressError`] when scanning or writing fails.
pub fn regenerate_manifest(work_dir: &Path) -> Result<RegressManifest, RegressError> {
    let fixtures_dir = work_dir.join("fixtures");
    let mut names = Vec::new();
    if fixtures_dir.is_dir() {
        let entries = fs::read_dir(&fixtures_dir).map_err(|err| RegressError::Io {
            path: fixtures_dir.clone(),
            reason: err.to_string(),
        })?;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.is_dir() && path.join(FIXTURE_SPEC_NAME).is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
    }
    names.sort();

    let manifest = RegressManifest {
        fixtures: names,
    };
    let text =
        serde_yaml::to_string(&manifest).map_err(|err| RegressError::Serialize(err.to_string()))?;
    fsx::write_file_atomic(
        &work_dir.join(MANIFEST_NAME),
        text.as_bytes(),
        fsx::DEFAULT_FILE_MODE,
    )?;
    Ok(manifest)
}

/// Loads the root manifest.
///
/// # Errors
///
/// Returns [`RegressError`] when the manifest is absent or malformed.
pub fn load_manifest(work_dir: &Path) -> Result<RegressManifest, RegressError> {
    let path = work_dir.join(MANIFEST_NAME);
    let text = fs::read_to_string(&path).map_err(|err| RegressError::Io {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    serde_yaml::from_str(&text).map_err(|err| RegressError::Parse {
        path,
        reason: err.to_string(),
    })
}

/// Loads one fixture description.
///
/// # Errors
///
/// Returns [`RegressError`] when the description is absent or malformed.
pub fn load_fixture_spec(work_dir: &Path, name: &str) -> Result<(FixtureSpec, PathBuf), RegressError> {
    let fixture_dir = work_dir.join("fixtures").join(name);
    let path = fixture_dir.join(FIXTURE_SPEC_NAME);
    let bytes = fs::read(&path).map_err(|err| RegressError::Io {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    let spec = serde_json::from_slice(&bytes).map_err(|err| RegressError::Parse {
        path,
        reason: err.to_string(),
    })?;
    Ok((spec, fixture_dir))
}
