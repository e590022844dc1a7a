// crates/gait-runpack/src/writer.rs
// ============================================================================
// Module: Runpack Writer
// Description: Deterministic runpack emission with manifest digesting.
// Purpose: Export a run's captured streams into a verifiable zip envelope.
// Dependencies: crate::model, gait-context, gait-core
// ============================================================================

//! ## Overview
//! The writer canonicalizes every record, composes the per-file hash index,
//! computes the manifest digest, optionally attaches detached signatures,
//! and emits the deterministic zip. Writing the same draft twice yields
//! byte-identical archives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use gait_context::EvidenceMode;
use gait_context::verify_envelope;
use gait_core::archive::ArchiveEntry;
use gait_core::archive::write_deterministic_zip;
use gait_core::fsx;
use gait_core::hashing::canonical_json_bytes;
use gait_core::hashing::digest_bytes;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::KeyPair;
use gait_core::signing::sign_digest_hex;
use serde::Serialize;

use crate::model::CaptureMode;
use crate::model::CONTEXT_ENVELOPE_PATH;
use crate::model::INTENTS_PATH;
use crate::model::IntentEntry;
use crate::model::MANIFEST_PATH;
use crate::model::ManifestFile;
use crate::model::REFS_PATH;
use crate::model::RESULTS_PATH;
use crate::model::RUN_PATH;
use crate::model::ResultEntry;
use crate::model::RunpackDraft;
use crate::model::RunpackError;
use crate::model::RunpackManifest;
use crate::model::manifest_digest;

// ============================================================================
// SECTION: Write Options
// ============================================================================

/// Options controlling runpack emission.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions<'a> {
    /// Capture mode recorded in the manifest.
    pub capture_mode: CaptureMode,
    /// Key used to sign the manifest digest, when signing is requested.
    pub signing_key: Option<&'a KeyPair>,
}

impl Default for WriteOptions<'_> {
    fn default() -> Self {
        Self {
            capture_mode: CaptureMode::Reference,
            signing_key: None,
        }
    }
}

// ============================================================================
// SECTION: Write Path
// ============================================================================

/// Writes a runpack atomically to `path`, returning the manifest.
///
/// # Errors
///
/// Returns [`RunpackError`] when validation, canonicalization, or I/O fails.
pub fn write_runpack(
    path: &Path,
    draft: &RunpackDraft,
    options: &WriteOptions<'_>,
) -> Result<RunpackManifest, RunpackError> {
    let (bytes, manifest) = write_runpack_bytes(draft, options)?;
    fsx::write_file_atomic(path, &bytes, fsx::DEFAULT_FILE_MODE)?;
    Ok(manifest)
}

/// Writes a runpack into memory, returning the archive bytes and manifest.
///
/// # Errors
///
/// Returns [`RunpackError`] when validation or canonicalization fails.
pub fn write_runpack_bytes(
    draft: &RunpackDraft,
    options: &WriteOptions<'_>,
) -> Result<(Vec<u8>, RunpackManifest), RunpackError> {
    let mut refs = draft.refs.clone();
    refs.normalize()?;

    if let Some(envelope) = &draft.context_envelope {
        verify_envelope(envelope)?;
        match &refs.context_set_digest {
            Some(digest) if digest != &envelope.context_set_digest => {
                return Err(RunpackError::ContextDigestMismatch {
                    refs: digest.clone(),
                    envelope: envelope.context_set_digest.clone(),
                });
            }
            Some(_) => {}
            None => gait_context::apply_envelope_to_refs(&mut refs, envelope),
        }
    }
    enforce_required_evidence(&refs)?;

    let mut entries = Vec::new();
    entries.push(ArchiveEntry::new(RUN_PATH, canonical_json_bytes(&draft.run)?));
    entries.push(ArchiveEntry::new(INTENTS_PATH, jsonl_bytes(&sorted_intents(&draft.intents)?)?));
    entries.push(ArchiveEntry::new(RESULTS_PATH, jsonl_bytes(&sorted_results(&draft.results))?));
    entries.push(ArchiveEntry::new(REFS_PATH, canonical_json_bytes(&refs)?));
    if let Some(envelope) = &draft.context_envelope {
        entries.push(ArchiveEntry::new(CONTEXT_ENVELOPE_PATH, canonical_json_bytes(envelope)?));
    }

    let manifest = build_manifest(&draft.run.run_id, options, &entries)?;
    entries.push(ArchiveEntry::new(MANIFEST_PATH, canonical_json_bytes(&manifest)?));

    let bytes = write_deterministic_zip(&entries)?;
    Ok((bytes, manifest))
}

/// Appends extra entries into a runpack draft emission.
///
/// Used by session checkpoints to carry the covered journal events while
/// keeping the standard entry set intact.
///
/// # Errors
///
/// Returns [`RunpackError`] when validation or canonicalization fails.
pub(crate) fn write_runpack_bytes_with_extras(
    draft: &RunpackDraft,
    options: &WriteOptions<'_>,
    extras: &[ArchiveEntry],
) -> Result<(Vec<u8>, RunpackManifest), RunpackError> {
    let mut refs = draft.refs.clone();
    refs.normalize()?;
    enforce_required_evidence(&refs)?;

    let mut entries = Vec::new();
    entries.push(ArchiveEntry::new(RUN_PATH, canonical_json_bytes(&draft.run)?));
    entries.push(ArchiveEntry::new(INTENTS_PATH, jsonl_bytes(&sorted_intents(&draft.intents)?)?));
    entries.push(ArchiveEntry::new(RESULTS_PATH, jsonl_bytes(&sorted_results(&draft.results))?));
    entries.push(ArchiveEntry::new(REFS_PATH, canonical_json_bytes(&refs)?));
    entries.extend(extras.iter().cloned());

    let manifest = build_manifest(&draft.run.run_id, options, &entries)?;
    entries.push(ArchiveEntry::new(MANIFEST_PATH, canonical_json_bytes(&manifest)?));

    let bytes = write_deterministic_zip(&entries)?;
    Ok((bytes, manifest))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the signed manifest over the emitted entries.
fn build_manifest(
    run_id: &str,
    options: &WriteOptions<'_>,
    entries: &[ArchiveEntry],
) -> Result<RunpackManifest, RunpackError> {
    let mut files: Vec<ManifestFile> = entries
        .iter()
        .map(|entry| ManifestFile {
            path: entry.path.clone(),
            sha256: digest_bytes(&entry.bytes).as_str().to_string(),
        })
        .collect();
    files.sort_by(|left, right| left.path.cmp(&right.path));

    let digest = manifest_digest(run_id, options.capture_mode, &files)?;
    let signatures = match options.signing_key {
        Some(key) => vec![sign_digest_hex(key, &digest)],
        None => Vec::new(),
    };

    Ok(RunpackManifest {
        header: ArtifactHeader::deterministic(ids::RUNPACK_MANIFEST),
        run_id: run_id.to_string(),
        capture_mode: options.capture_mode,
        files,
        manifest_digest: digest.as_str().to_string(),
        signatures,
    })
}

/// Rejects refs that require evidence without carrying a set digest.
fn enforce_required_evidence(refs: &gait_context::RunRefs) -> Result<(), RunpackError> {
    let required = refs.context_evidence_mode == Some(EvidenceMode::Required);
    let missing =
        refs.context_set_digest.as_deref().map_or(true, |digest| digest.trim().is_empty());
    if required && missing {
        return Err(RunpackError::MissingContextDigest);
    }
    Ok(())
}

/// Sorts intents by sequence then identifier, rejecting duplicates.
fn sorted_intents(intents: &[IntentEntry]) -> Result<Vec<IntentEntry>, RunpackError> {
    let mut seen = std::collections::BTreeSet::new();
    for intent in intents {
        if !seen.insert(intent.intent_id.as_str()) {
            return Err(RunpackError::DuplicateIntent {
                intent_id: intent.intent_id.clone(),
            });
        }
    }
    let mut out = intents.to_vec();
    out.sort_by(|left, right| {
        (left.sequence, &left.intent_id).cmp(&(right.sequence, &right.intent_id))
    });
    Ok(out)
}

/// Sorts results by intent identifier for stable emission.
fn sorted_results(results: &[ResultEntry]) -> Vec<ResultEntry> {
    let mut out = results.to_vec();
    out.sort_by(|left, right| left.intent_id.cmp(&right.intent_id));
    out
}

/// Renders records as canonical JSONL, one record per line.
fn jsonl_bytes<T: Serialize>(records: &[T]) -> Result<Vec<u8>, RunpackError> {
    let mut bytes = Vec::new();
    for record in records {
        bytes.extend_from_slice(&canonical_json_bytes(record)?);
        bytes.push(b'\n');
    }
    Ok(bytes)
}
