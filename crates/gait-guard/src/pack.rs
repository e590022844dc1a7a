// crates/gait-guard/src/pack.rs
// ============================================================================
// Module: Evidence Pack Builder
// Description: Assembles evidence packs over runpack, trace, and regress.
// Purpose: Bundle an audit-ready, hash-indexed evidence archive.
// Dependencies: crate::{inventory, summary}, gait-core, gait-gate,
// gait-regress, gait-runpack, serde
// ============================================================================

//! ## Overview
//! Building a pack reads and verifies the source runpack, derives summary
//! artifacts, snapshots inventories, and folds caller-provided audit
//! records and extra evidence files into one deterministic zip. The pack
//! manifest indexes every entry by SHA-256; `pack_id` is `pack_` plus the
//! first sixteen hex characters of the digest over the run identifier and
//! the contents index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use gait_core::archive::ArchiveEntry;
use gait_core::archive::ArchiveError;
use gait_core::archive::write_deterministic_zip_file;
use gait_core::fsx;
use gait_core::fsx::FsxError;
use gait_core::hashing::Digest;
use gait_core::hashing::HashError;
use gait_core::hashing::canonical_json_bytes;
use gait_core::hashing::digest_bytes;
use gait_core::hashing::digest_canonical_json;
use gait_core::schema;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::ArtifactSignature;
use gait_core::signing::KeyPair;
use gait_core::signing::SigningError;
use gait_core::signing::sign_digest_hex;
use gait_gate::TraceRecord;
use gait_regress::RegressResult;
use gait_runpack::RunpackError;
use gait_runpack::SessionJournal;
use gait_runpack::VerifyOptions;
use gait_runpack::read_runpack;
use gait_runpack::verify_session_chain;
use gait_runpack::verify_zip;

use crate::inventory::snapshot_directory;
use crate::summary::RegressSummary;
use crate::summary::RunpackSummary;
use crate::summary::TraceSummary;

// ============================================================================
// SECTION: Manifest Model
// ============================================================================

/// One declared file inside an evidence pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackFile {
    /// Archive-relative file path.
    pub path: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub sha256: String,
}

/// Evidence pack manifest (`pack_manifest.json`).
///
/// # Invariants
/// - `pack_id` is `pack_` plus the first sixteen hex characters of the
///   digest over `{files, run_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackManifest {
    /// Common artifact header.
    #[serde(flatten)]
    pub header: ArtifactHeader,
    /// Pack identifier.
    pub pack_id: String,
    /// Run identifier the pack evidences.
    pub run_id: String,
    /// Declared files with digests, sorted by path.
    pub files: Vec<PackFile>,
    /// Detached signatures over the pack digest.
    #[serde(default)]
    pub signatures: Vec<ArtifactSignature>,
}

/// Canonical digest input for a pack manifest.
#[derive(Serialize)]
struct PackDigestInput<'a> {
    /// Declared files with digests.
    files: &'a [PackFile],
    /// Run identifier.
    run_id: &'a str,
}

/// Computes the pack digest over `{files, run_id}`.
///
/// # Errors
///
/// Returns [`GuardError::Hash`] when canonicalization fails.
pub(crate) fn pack_digest(run_id: &str, files: &[PackFile]) -> Result<Digest, GuardError> {
    Ok(digest_canonical_json(&PackDigestInput {
        files,
        run_id,
    })?)
}

// ============================================================================
// SECTION: Build Options
// ============================================================================

/// Options for building an evidence pack.
#[derive(Default)]
pub struct BuildPackOptions<'a> {
    /// Source runpack to evidence.
    pub runpack_path: PathBuf,
    /// Trace record files to summarize.
    pub trace_paths: Vec<PathBuf>,
    /// Regression result file to summarize, when one exists.
    pub regress_result_path: Option<PathBuf>,
    /// Approval audit records to embed.
    pub approval_records: Vec<serde_json::Value>,
    /// Credential evidence records to embed.
    pub credential_records: Vec<serde_json::Value>,
    /// Directories to snapshot as inventories.
    pub inventory_dirs: Vec<PathBuf>,
    /// Extra evidence files as `(entry_name, source_path)` pairs.
    pub extra_files: Vec<(String, PathBuf)>,
    /// Session journal whose checkpoint runpacks are referenced.
    pub session_journal: Option<&'a SessionJournal>,
    /// Key used to sign the pack digest, when signing is requested.
    pub signing_key: Option<&'a KeyPair>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evidence pack errors.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Runpack read or verification failure.
    #[error(transparent)]
    Runpack(#[from] RunpackError),
    /// Session chain operation failure.
    #[error(transparent)]
    Session(#[from] gait_runpack::SessionError),
    /// Archive container failure.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    /// Filesystem primitive failure.
    #[error(transparent)]
    Fsx(#[from] FsxError),
    /// Canonicalization failure.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Signature creation or verification failure.
    #[error(transparent)]
    Signature(#[from] SigningError),
    /// Filesystem operation failed.
    #[error("guard io failure at {path}: {reason}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Failure description.
        reason: String,
    },
    /// Evidence content failed to parse.
    #[error("guard parse error at {path}: {reason}")]
    Parse {
        /// Offending file path.
        path: PathBuf,
        /// Parse failure description.
        reason: String,
    },
    /// Source runpack failed verification.
    #[error("source runpack failed verification: {path}")]
    SourceNotVerified {
        /// Rejected source path.
        path: PathBuf,
    },
    /// An extra evidence entry carried an unsafe name.
    #[error("unsafe evidence entry name: {name}")]
    UnsafeEntryName {
        /// Rejected entry name.
        name: String,
    },
    /// A supplied audit record failed schema validation.
    #[error("invalid evidence record {name}: {reason}")]
    InvalidRecord {
        /// Record entry name.
        name: String,
        /// Validation failure description.
        reason: String,
    },
    /// A required archive entry is absent.
    #[error("missing pack entry: {path}")]
    MissingEntry {
        /// Absent entry path.
        path: String,
    },
}

impl From<GuardError> for gait_core::ClassifiedError {
    fn from(err: GuardError) -> Self {
        use gait_core::ErrorCategory;
        match err {
            GuardError::Runpack(inner) => inner.into(),
            GuardError::Session(inner) => inner.into(),
            GuardError::Archive(inner) => inner.into(),
            GuardError::Fsx(inner) => inner.into(),
            GuardError::Hash(inner) => inner.into(),
            GuardError::Signature(inner) => inner.into(),
            other => {
                let (category, code) = match &other {
                    GuardError::Io { .. } => (ErrorCategory::IoFailure, "io_failure"),
                    GuardError::Parse { .. } => (ErrorCategory::InvalidInput, "pack_parse"),
                    GuardError::SourceNotVerified { .. } => {
                        (ErrorCategory::VerificationFailed, "source_not_verified")
                    }
                    GuardError::UnsafeEntryName { .. } | GuardError::InvalidRecord { .. } => {
                        (ErrorCategory::InvalidInput, "evidence_invalid")
                    }
                    GuardError::MissingEntry { .. } => {
                        (ErrorCategory::VerificationFailed, "missing_entry")
                    }
                    _ => (ErrorCategory::InternalFailure, "internal_failure"),
                };
                Self::new(category, code, other.to_string()).with_cause(other)
            }
        }
    }
}

// ============================================================================
// SECTION: Build
// ============================================================================

/// Archive path of the pack manifest.
pub const PACK_MANIFEST_PATH: &str = "pack_manifest.json";
/// Archive path of the runpack summary.
pub const RUNPACK_SUMMARY_PATH: &str = "runpack_summary.json";
/// Archive path of the referenced-runpacks index.
pub const REFERENCED_RUNPACKS_PATH: &str = "referenced_runpacks.json";
/// Archive path of the trace summary.
pub const TRACE_SUMMARY_PATH: &str = "trace_summary.json";
/// Archive path of the regress summary.
pub const REGRESS_SUMMARY_PATH: &str = "regress_summary.json";

/// One referenced runpack in `referenced_runpacks.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ReferencedRunpack {
    /// Runpack location relative to the evidence source.
    path: String,
    /// Manifest digest of the referenced runpack.
    manifest_digest: String,
}

/// Builds an evidence pack and writes it atomically to `output`.
///
/// # Errors
///
/// Returns [`GuardError`] when the source runpack fails verification or
/// any evidence input is unreadable.
pub fn build_pack(output: &Path, options: &BuildPackOptions<'_>) -> Result<PackManifest, GuardError> {
    let report = verify_zip(&options.runpack_path, &VerifyOptions::default())?;
    if !report.passed {
        return Err(GuardError::SourceNotVerified {
            path: options.runpack_path.clone(),
        });
    }
    let pack = read_runpack(&options.runpack_path)?;

    let mut entries = Vec::new();
    push_json(&mut entries, RUNPACK_SUMMARY_PATH, &RunpackSummary::from_pack(&pack, &report))?;
    push_json(&mut entries, REFERENCED_RUNPACKS_PATH, &referenced_runpacks(options, &report)?)?;

    if !options.trace_paths.is_empty() {
        let records = load_traces(&options.trace_paths)?;
        push_json(&mut entries, TRACE_SUMMARY_PATH, &TraceSummary::from_records(&records))?;
    }
    if let Some(path) = &options.regress_result_path {
        let result = load_regress(path)?;
        push_json(&mut entries, REGRESS_SUMMARY_PATH, &RegressSummary::from_result(&result))?;
    }
    for (index, record) in options.approval_records.iter().enumerate() {
        let name = format!("approval_audit_{index}.json");
        schema::validate_value(ids::GATE_APPROVAL_AUDIT, record).map_err(|err| {
            GuardError::InvalidRecord {
                name: name.clone(),
                reason: err.to_string(),
            }
        })?;
        push_json(&mut entries, &name, record)?;
    }
    for (index, record) in options.credential_records.iter().enumerate() {
        push_json(&mut entries, &format!("credential_evidence_{index}.json"), record)?;
    }
    for (index, dir) in options.inventory_dirs.iter().enumerate() {
        let snapshot = snapshot_directory(dir)?;
        push_json(&mut entries, &format!("inventory_snapshot_{index}.json"), &snapshot)?;
    }
    for (name, source) in &options.extra_files {
        fsx::validate_archive_entry_path(name).map_err(|_| GuardError::UnsafeEntryName {
            name: name.clone(),
        })?;
        let bytes = fs::read(source).map_err(|err| GuardError::Io {
            path: source.clone(),
            reason: err.to_string(),
        })?;
        entries.push(ArchiveEntry::new(name.clone(), bytes));
    }

    let manifest = build_manifest(&pack.run.run_id, options.signing_key, &entries)?;
    entries.push(ArchiveEntry::new(PACK_MANIFEST_PATH, canonical_json_bytes(&manifest)?));
    write_deterministic_zip_file(output, &entries)?;
    Ok(manifest)
}

/// Builds the signed pack manifest over the emitted entries.
fn build_manifest(
    run_id: &str,
    signing_key: Option<&KeyPair>,
    entries: &[ArchiveEntry],
) -> Result<PackManifest, GuardError> {
    let mut files: Vec<PackFile> = entries
        .iter()
        .map(|entry| PackFile {
            path: entry.path.clone(),
            sha256: digest_bytes(&entry.bytes).as_str().to_string(),
        })
        .collect();
    files.sort_by(|left, right| left.path.cmp(&right.path));

    let digest = pack_digest(run_id, &files)?;
    let signatures = match signing_key {
        Some(key) => vec![sign_digest_hex(key, &digest)],
        None => Vec::new(),
    };

    Ok(PackManifest {
        header: ArtifactHeader::deterministic(ids::GUARD_PACK_MANIFEST),
        pack_id: format!("pack_{}", digest.short()),
        run_id: run_id.to_string(),
        files,
        signatures,
    })
}

/// Lists the source runpack plus checkpoint runpacks from the session chain.
fn referenced_runpacks(
    options: &BuildPackOptions<'_>,
    report: &gait_runpack::VerifyReport,
) -> Result<Vec<ReferencedRunpack>, GuardError> {
    let mut referenced = vec![ReferencedRunpack {
        path: options.runpack_path.display().to_string(),
        manifest_digest: report.manifest_digest.clone(),
    }];
    if let Some(journal) = options.session_journal {
        let chain_report = verify_session_chain(journal)?;
        if chain_report.passed {
            let dir = journal.path().parent().map_or_else(PathBuf::new, Path::to_path_buf);
            for index in 1 ..= chain_report.checkpoints_verified {
                let name = format!("checkpoint_{index}.zip");
                let checkpoint_report = verify_zip(&dir.join(&name), &VerifyOptions::default())?;
                referenced.push(ReferencedRunpack {
                    path: name,
                    manifest_digest: checkpoint_report.manifest_digest,
                });
            }
        }
    }
    Ok(referenced)
}

/// Loads and parses trace records from disk.
fn load_traces(paths: &[PathBuf]) -> Result<Vec<TraceRecord>, GuardError> {
    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(path).map_err(|err| GuardError::Io {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let record = serde_json::from_slice(&bytes).map_err(|err| GuardError::Parse {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Loads and parses a regression result from disk.
fn load_regress(path: &Path) -> Result<RegressResult, GuardError> {
    let bytes = fs::read(path).map_err(|err| GuardError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| GuardError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Serializes a value canonically and appends it as an archive entry.
fn push_json<T: Serialize>(
    entries: &mut Vec<ArchiveEntry>,
    name: &str,
    value: &T,
) -> Result<(), GuardError> {
    entries.push(ArchiveEntry::new(name, canonical_json_bytes(value)?));
    Ok(())
}
