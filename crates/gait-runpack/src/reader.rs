// crates/gait-runpack/src/reader.rs
// ============================================================================
// Module: Runpack Reader and Verifier
// Description: Runpack read path with fail-closed integrity verification.
// Purpose: Reject tampered, truncated, or misdeclared runpacks on load.
// Dependencies: crate::model, gait-context, gait-core, serde_json
// ============================================================================

//! ## Overview
//! Reading a runpack verifies every declared file hash, recomputes the
//! manifest digest, and normalizes the context references before any record
//! is handed to callers. Verification reports carry the full missing and
//! mismatched file lists plus the signature status so hosts can render one
//! decision from one pass.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use gait_context::EvidenceMode;
use gait_context::RunRefs;
use gait_core::archive::read_zip_entries;
use gait_core::hashing::Digest;
use gait_core::hashing::digest_bytes;
use gait_core::signing::VerifyingKey;
use gait_core::signing::verify_digest_hex;

use crate::model::CONTEXT_ENVELOPE_PATH;
use crate::model::INTENTS_PATH;
use crate::model::IntentEntry;
use crate::model::MANIFEST_PATH;
use crate::model::REFS_PATH;
use crate::model::RESULTS_PATH;
use crate::model::RUN_PATH;
use crate::model::ResultEntry;
use crate::model::RunRecord;
use crate::model::Runpack;
use crate::model::RunpackError;
use crate::model::RunpackManifest;
use crate::model::manifest_digest;

// ============================================================================
// SECTION: Read Path
// ============================================================================

/// Reads and verifies a runpack from disk.
///
/// # Errors
///
/// Returns [`RunpackError`] with `verification_failed` semantics when any
/// declared file is missing or mismatched, and parse errors for malformed
/// entries.
pub fn read_runpack(path: &Path) -> Result<Runpack, RunpackError> {
    let entries = read_zip_entries(path)?;
    read_runpack_entries(&entries)
}

/// Reads and verifies a runpack from loaded archive entries.
///
/// # Errors
///
/// Returns [`RunpackError`] when integrity or parsing fails.
pub fn read_runpack_entries(entries: &BTreeMap<String, Vec<u8>>) -> Result<Runpack, RunpackError> {
    let manifest: RunpackManifest = parse_entry(entries, MANIFEST_PATH)?;
    verify_declared_files(&manifest, entries)?;
    verify_manifest_digest(&manifest)?;

    let run: RunRecord = parse_entry(entries, RUN_PATH)?;
    let intents: Vec<IntentEntry> = parse_jsonl(entries, INTENTS_PATH)?;
    let results: Vec<ResultEntry> = parse_jsonl(entries, RESULTS_PATH)?;
    let mut refs: RunRefs = parse_entry(entries, REFS_PATH)?;
    refs.normalize()?;

    if refs.context_evidence_mode == Some(EvidenceMode::Required)
        && refs.context_set_digest.is_none()
    {
        return Err(RunpackError::MissingContextDigest);
    }

    let context_envelope = match entries.get(CONTEXT_ENVELOPE_PATH) {
        Some(bytes) => Some(gait_context::parse_envelope(bytes)?),
        None => None,
    };

    Ok(Runpack {
        manifest,
        run,
        intents,
        results,
        refs,
        context_envelope,
    })
}

// ============================================================================
// SECTION: Verify
// ============================================================================

/// Signature verification outcome for a verify pass.
///
/// # Invariants
/// - Variants are stable for serialization and report matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// No signatures are attached.
    Missing,
    /// Signatures exist but no verifying key was supplied.
    Skipped,
    /// Every signature verified against the manifest digest.
    Verified,
    /// At least one signature failed verification.
    Failed,
}

/// Options for a verification pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
    /// Fail verification when no signature verifies.
    pub require_signature: bool,
    /// Key used to verify attached signatures.
    pub verifying_key: Option<&'a VerifyingKey>,
}

/// Verification report for one runpack archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Run identifier from the manifest.
    pub run_id: String,
    /// Stored manifest digest.
    pub manifest_digest: String,
    /// Count of declared files checked.
    pub files_checked: usize,
    /// Declared files absent from the archive.
    pub missing_files: Vec<String>,
    /// Declared files whose hashes do not match.
    pub hash_mismatches: Vec<String>,
    /// Signature verification outcome.
    pub signature_status: SignatureStatus,
    /// True when integrity and signature requirements both held.
    pub passed: bool,
}

/// Verifies a runpack archive without materializing its records.
///
/// # Errors
///
/// Returns [`RunpackError`] only for container-level failures; integrity
/// findings are reported in the returned [`VerifyReport`].
pub fn verify_zip(path: &Path, options: &VerifyOptions<'_>) -> Result<VerifyReport, RunpackError> {
    let entries = read_zip_entries(path)?;
    let manifest: RunpackManifest = parse_entry(&entries, MANIFEST_PATH)?;

    let mut missing_files = Vec::new();
    let mut hash_mismatches = Vec::new();
    let mut files_checked = 0usize;
    for file in &manifest.files {
        if file.path == MANIFEST_PATH {
            continue;
        }
        files_checked = files_checked.saturating_add(1);
        match entries.get(&file.path) {
            None => missing_files.push(file.path.clone()),
            Some(bytes) => {
                if digest_bytes(bytes).as_str() != file.sha256 {
                    hash_mismatches.push(file.path.clone());
                }
            }
        }
    }
    missing_files.sort();
    hash_mismatches.sort();

    let digest_ok = verify_manifest_digest(&manifest).is_ok();
    let signature_status = signature_status(&manifest, options);
    let signature_ok = match signature_status {
        SignatureStatus::Verified => true,
        SignatureStatus::Failed => false,
        SignatureStatus::Missing | SignatureStatus::Skipped => !options.require_signature,
    };

    let passed =
        digest_ok && missing_files.is_empty() && hash_mismatches.is_empty() && signature_ok;

    Ok(VerifyReport {
        run_id: manifest.run_id.clone(),
        manifest_digest: manifest.manifest_digest.clone(),
        files_checked,
        missing_files,
        hash_mismatches,
        signature_status,
        passed,
    })
}

/// Computes the signature status for a manifest under the given options.
fn signature_status(manifest: &RunpackManifest, options: &VerifyOptions<'_>) -> SignatureStatus {
    if manifest.signatures.is_empty() {
        return SignatureStatus::Missing;
    }
    let Some(key) = options.verifying_key else {
        return SignatureStatus::Skipped;
    };
    let Ok(digest) = Digest::parse(&manifest.manifest_digest) else {
        return SignatureStatus::Failed;
    };
    let all_valid = manifest
        .signatures
        .iter()
        .all(|signature| verify_digest_hex(key, signature, &digest).is_ok());
    if all_valid { SignatureStatus::Verified } else { SignatureStatus::Failed }
}

// ============================================================================
// SECTION: Integrity Helpers
// ============================================================================

/// Verifies every declared file exists with a matching digest.
fn verify_declared_files(
    manifest: &RunpackManifest,
    entries: &BTreeMap<String, Vec<u8>>,
) -> Result<(), RunpackError> {
    let mut missing_files = Vec::new();
    let mut hash_mismatches = Vec::new();
    for file in &manifest.files {
        if file.path == MANIFEST_PATH {
            continue;
        }
        match entries.get(&file.path) {
            None => missing_files.push(file.path.clone()),
            Some(bytes) => {
                if digest_bytes(bytes).as_str() != file.sha256 {
                    hash_mismatches.push(file.path.clone());
                }
            }
        }
    }
    if missing_files.is_empty() && hash_mismatches.is_empty() {
        Ok(())
    } else {
        missing_files.sort();
        hash_mismatches.sort();
        Err(RunpackError::Verification {
            missing_files,
            hash_mismatches,
        })
    }
}

/// Recomputes and checks the stored manifest digest.
fn verify_manifest_digest(manifest: &RunpackManifest) -> Result<(), RunpackError> {
    let computed = manifest_digest(&manifest.run_id, manifest.capture_mode, &manifest.files)?;
    if computed.as_str() == manifest.manifest_digest {
        Ok(())
    } else {
        Err(RunpackError::ManifestDigestMismatch {
            stored: manifest.manifest_digest.clone(),
            computed: computed.as_str().to_string(),
        })
    }
}

/// Parses one JSON entry from the archive.
fn parse_entry<T: DeserializeOwned>(
    entries: &BTreeMap<String, Vec<u8>>,
    path: &str,
) -> Result<T, RunpackError> {
    let bytes = entries.get(path).ok_or_else(|| RunpackError::MissingEntry {
        path: path.to_string(),
    })?;
    serde_json::from_slice(bytes).map_err(|err| RunpackError::Parse {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

/// Parses one JSONL entry from the archive, one record per line.
fn parse_jsonl<T: DeserializeOwned>(
    entries: &BTreeMap<String, Vec<u8>>,
    path: &str,
) -> Result<Vec<T>, RunpackError> {
    let bytes = entries.get(path).ok_or_else(|| RunpackError::MissingEntry {
        path: path.to_string(),
    })?;
    let text = std::str::from_utf8(bytes).map_err(|err| RunpackError::Parse {
        path: path.to_string(),
        reason: err.to_string(),
    })?;
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|err| RunpackError::Parse {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}
