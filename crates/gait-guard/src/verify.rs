// crates/gait-guard/src/verify.rs
// ============================================================================
// Module: Evidence Pack Verification
// Description: Re-checks every declared pack entry and signature.
// Purpose: Let auditors trust a pack only after it proves itself.
// Dependencies: crate::pack, gait-core, serde
// ============================================================================

//! ## Overview
//! Verification opens the pack, parses the manifest, confirms every
//! declared file's SHA-256, recomputes the pack identifier, and verifies
//! attached signatures when a key is supplied. Findings accumulate into one
//! report so a single pass renders the full picture.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use gait_core::archive::read_zip_entries;
use gait_core::hashing::digest_bytes;
use gait_core::signing::VerifyingKey;
use gait_core::signing::verify_digest_hex;

use crate::pack::GuardError;
use crate::pack::PACK_MANIFEST_PATH;
use crate::pack::PackManifest;
use crate::pack::pack_digest;

// ============================================================================
// SECTION: Report Model
// ============================================================================

/// Signature verification outcome for a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackSignatureStatus {
    /// No signatures are attached.
    Missing,
    /// Signatures exist but no verifying key was supplied.
    Skipped,
    /// Every signature verified.
    Verified,
    /// At least one signature failed.
    Failed,
}

/// Options for a pack verification pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackVerifyOptions<'a> {
    /// Fail verification when no signature verifies.
    pub require_signature: bool,
    /// Key used to verify attached signatures.
    pub verifying_key: Option<&'a VerifyingKey>,
}

/// Verification report for one evidence pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackVerifyReport {
    /// Pack identifier from the manifest.
    pub pack_id: String,
    /// Run identifier from the manifest.
    pub run_id: String,
    /// Count of declared files checked.
    pub files_checked: usize,
    /// Declared files absent from the archive.
    pub missing_files: Vec<String>,
    /// Declared files whose hashes do not match.
    pub hash_mismatches: Vec<String>,
    /// Signature verification outcome.
    pub signature_status: PackSignatureStatus,
    /// Count of signatures attached.
    pub signatures_total: usize,
    /// Count of signatures that verified.
    pub signatures_valid: usize,
    /// Signature failure descriptions.
    pub signature_errors: Vec<String>,
    /// True when integrity and signature requirements both held.
    pub passed: bool,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies an evidence pack archive.
///
/// # Errors
///
/// Returns [`GuardError`] only for container-level failures; integrity
/// findings are reported in the returned [`PackVerifyReport`].
pub fn verify_pack(
    path: &Path,
    options: &PackVerifyOptions<'_>,
) -> Result<PackVerifyReport, GuardError> {
    let entries = read_zip_entries(path)?;
    let manifest_bytes = entries.get(PACK_MANIFEST_PATH).ok_or(GuardError::MissingEntry {
        path: PACK_MANIFEST_PATH.to_string(),
    })?;
    let manifest: PackManifest =
        serde_json::from_slice(manifest_bytes).map_err(|err| GuardError::Parse {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let mut missing_files = Vec::new();
    let mut hash_mismatches = Vec::new();
    let mut files_checked = 0usize;
    for file in &manifest.files {
        if file.path == PACK_MANIFEST_PATH {
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

    let digest = pack_digest(&manifest.run_id, &manifest.files)?;
    let pack_id_ok = manifest.pack_id == format!("pack_{}", digest.short());

    let mut signature_errors = Vec::new();
    let mut signatures_valid = 0usize;
    let signature_status = if manifest.signatures.is_empty() {
        PackSignatureStatus::Missing
    } else if let Some(key) = options.verifying_key {
        for signature in &manifest.signatures {
            match verify_digest_hex(key, signature, &digest) {
                Ok(()) => signatures_valid = signatures_valid.saturating_add(1),
                Err(err) => signature_errors.push(err.to_string()),
            }
        }
        if signature_errors.is_empty() {
            PackSignatureStatus::Verified
        } else {
            PackSignatureStatus::Failed
        }
    } else {
        PackSignatureStatus::Skipped
    };

    let signature_ok = match signature_status {
        PackSignatureStatus::Verified => true,
        PackSignatureStatus::Failed => false,
        PackSignatureStatus::Missing | PackSignatureStatus::Skipped => !options.require_signature,
    };
    let passed =
        pack_id_ok && missing_files.is_empty() && hash_mismatches.is_empty() && signature_ok;

    Ok(PackVerifyReport {
        pack_id: manifest.pack_id.clone(),
        run_id: manifest.run_id.clone(),
        files_checked,
        missing_files,
        hash_mismatches,
        signature_status,
        signatures_total: manifest.signatures.len(),
        signatures_valid,
        signature_errors,
        passed,
    })
}
