// crates/gait-runpack/tests/runpack.rs
// ============================================================================
// Module: Runpack Round-Trip Tests
// Description: Verifies write/read/verify/replay/diff behavior end to end.
// ============================================================================
//! ## Overview
//! Writing then verifying must pass, manifest digests must survive the
//! round trip, identical drafts must produce identical bytes, and tampering
//! must fail closed.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use gait_context::BuildEnvelopeOptions;
use gait_context::EvidenceMode;
use gait_context::ReferenceRecord;
use gait_context::RunRefs;
use gait_context::build_envelope;
use gait_core::archive::ArchiveEntry;
use gait_core::archive::read_zip_entries;
use gait_core::archive::write_deterministic_zip_file;
use gait_core::hashing::digest_bytes;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::KeyPair;
use gait_runpack::CaptureMode;
use gait_runpack::IntentEntry;
use gait_runpack::ResultEntry;
use gait_runpack::ResultStatus;
use gait_runpack::RunRecord;
use gait_runpack::RunpackDraft;
use gait_runpack::RunpackError;
use gait_runpack::SignatureStatus;
use gait_runpack::VerifyOptions;
use gait_runpack::WriteOptions;
use gait_runpack::diff_runpacks;
use gait_runpack::read_runpack;
use gait_runpack::replay_runpack;
use gait_runpack::verify_zip;
use gait_runpack::write_runpack;
use gait_runpack::write_runpack_bytes;

/// Builds an intent entry for tests.
fn intent(intent_id: &str, tool: &str) -> IntentEntry {
    IntentEntry {
        intent_id: intent_id.to_string(),
        sequence: None,
        tool_name: tool.to_string(),
        intent_digest: digest_bytes(intent_id.as_bytes()).as_str().to_string(),
        request: Some(serde_json::json!({"tool_name": tool})),
    }
}

/// Builds a result entry for tests.
fn result(intent_id: &str, exit_code: i32) -> ResultEntry {
    ResultEntry {
        intent_id: intent_id.to_string(),
        status: if exit_code == 0 { ResultStatus::Ok } else { ResultStatus::Error },
        exit_code: Some(exit_code),
        result_digest: digest_bytes(intent_id.as_bytes()).as_str().to_string(),
        output: None,
        error: None,
        observed_at: "2026-03-01T12:00:00Z".to_string(),
    }
}

/// Builds a minimal draft with two intent/result pairs.
fn draft(run_id: &str) -> RunpackDraft {
    RunpackDraft {
        run: RunRecord {
            header: ArtifactHeader::deterministic(ids::RUNPACK_RUN),
            run_id: run_id.to_string(),
            env: BTreeMap::from([("os".to_string(), "linux".to_string())]),
            timeline: Vec::new(),
        },
        intents: vec![intent("int_1", "tool.read"), intent("int_2", "tool.write")],
        results: vec![result("int_1", 0), result("int_2", 0)],
        refs: RunRefs::empty(),
        context_envelope: None,
    }
}

#[test]
fn write_then_read_preserves_manifest_digest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    let manifest = write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");

    let pack = read_runpack(&path).expect("read");
    assert_eq!(pack.manifest.manifest_digest, manifest.manifest_digest);
    assert_eq!(pack.run.run_id, "run_1");
    assert_eq!(pack.intents.len(), 2);
    assert_eq!(pack.results.len(), 2);
}

#[test]
fn write_then_verify_passes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");

    let report = verify_zip(&path, &VerifyOptions::default()).expect("verify");
    assert!(report.passed);
    assert!(report.missing_files.is_empty());
    assert!(report.hash_mismatches.is_empty());
    assert_eq!(report.signature_status, SignatureStatus::Missing);
}

#[test]
fn identical_drafts_produce_identical_bytes() {
    let (first, _) = write_runpack_bytes(&draft("run_1"), &WriteOptions::default()).expect("first");
    let (second, _) =
        write_runpack_bytes(&draft("run_1"), &WriteOptions::default()).expect("second");
    assert_eq!(first, second, "runpack emission must be byte deterministic");
}

#[test]
fn tampered_entry_fails_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");

    // Rewrite the archive with a mutated results stream and untouched manifest.
    let mut entries = read_zip_entries(&path).expect("entries");
    entries.insert("results.jsonl".to_string(), b"tampered\n".to_vec());
    let rewritten: Vec<ArchiveEntry> = entries
        .iter()
        .map(|(name, bytes)| ArchiveEntry::new(name.clone(), bytes.clone()))
        .collect();
    write_deterministic_zip_file(&path, &rewritten).expect("rewrite");

    let report = verify_zip(&path, &VerifyOptions::default()).expect("verify");
    assert!(!report.passed);
    assert_eq!(report.hash_mismatches, vec!["results.jsonl".to_string()]);

    let err = read_runpack(&path).unwrap_err();
    assert!(matches!(err, RunpackError::Verification { .. }));
}

#[test]
fn missing_declared_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");

    let mut entries = read_zip_entries(&path).expect("entries");
    entries.remove("refs.json");
    let rewritten: Vec<ArchiveEntry> = entries
        .iter()
        .map(|(name, bytes)| ArchiveEntry::new(name.clone(), bytes.clone()))
        .collect();
    write_deterministic_zip_file(&path, &rewritten).expect("rewrite");

    let report = verify_zip(&path, &VerifyOptions::default()).expect("verify");
    assert!(!report.passed);
    assert_eq!(report.missing_files, vec!["refs.json".to_string()]);
}

#[test]
fn signed_runpack_verifies_with_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    let key = KeyPair::generate();
    let options = WriteOptions {
        capture_mode: CaptureMode::Reference,
        signing_key: Some(&key),
    };
    write_runpack(&path, &draft("run_1"), &options).expect("write");

    let verifying = key.verifying_key();
    let report = verify_zip(
        &path,
        &VerifyOptions {
            require_signature: true,
            verifying_key: Some(&verifying),
        },
    )
    .expect("verify");
    assert!(report.passed);
    assert_eq!(report.signature_status, SignatureStatus::Verified);

    let other = KeyPair::generate().verifying_key();
    let report = verify_zip(
        &path,
        &VerifyOptions {
            require_signature: true,
            verifying_key: Some(&other),
        },
    )
    .expect("verify with wrong key");
    assert!(!report.passed);
    assert_eq!(report.signature_status, SignatureStatus::Failed);
}

#[test]
fn required_evidence_without_digest_is_rejected() {
    let mut bad = draft("run_1");
    bad.refs.context_evidence_mode = Some(EvidenceMode::Required);
    let err = write_runpack_bytes(&bad, &WriteOptions::default()).unwrap_err();
    assert!(matches!(err, RunpackError::MissingContextDigest));
}

#[test]
fn envelope_continuity_lands_in_refs() {
    let record = ReferenceRecord {
        ref_id: "ref_a".to_string(),
        source_type: "file".to_string(),
        source_locator: "src/a.rs".to_string(),
        query_digest: String::new(),
        content_digest: digest_bytes(b"alpha").as_str().to_string(),
        retrieved_at: "2026-03-01T12:00:00Z".to_string(),
        redaction_mode: gait_context::RedactionMode::Raw,
        immutability: gait_context::Immutability::Unknown,
        freshness_sla_seconds: None,
        sensitivity_label: None,
        retrieval_params: None,
    };
    let envelope = build_envelope(
        vec![record],
        &BuildEnvelopeOptions {
            context_set_id: "ctx_1".to_string(),
            evidence_mode: EvidenceMode::Required,
        },
    )
    .expect("envelope");

    let mut with_envelope = draft("run_1");
    with_envelope.context_envelope = Some(envelope.clone());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &with_envelope, &WriteOptions::default()).expect("write");

    let pack = read_runpack(&path).expect("read");
    assert_eq!(pack.refs.context_set_digest.as_deref(), Some(envelope.context_set_digest.as_str()));
    assert_eq!(pack.refs.context_ref_count, Some(1));
    assert!(pack.context_envelope.is_some());
}

#[test]
fn verification_failures_classify_for_callers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");

    let mut entries = read_zip_entries(&path).expect("entries");
    entries.remove("refs.json");
    let rewritten: Vec<ArchiveEntry> = entries
        .iter()
        .map(|(name, bytes)| ArchiveEntry::new(name.clone(), bytes.clone()))
        .collect();
    write_deterministic_zip_file(&path, &rewritten).expect("rewrite");

    let err = read_runpack(&path).unwrap_err();
    let classified = gait_core::ClassifiedError::from(err);
    assert_eq!(classified.category, gait_core::ErrorCategory::VerificationFailed);
    assert_eq!(classified.exit_code(), 2);
    assert!(!classified.retryable);
    let envelope = classified.envelope();
    assert!(!envelope.ok);
    assert_eq!(envelope.error_code, "runpack_verification_failed");
}

// ============================================================================
// SECTION: Replay
// ============================================================================

#[test]
fn replay_reports_zero_for_complete_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");
    let pack = read_runpack(&path).expect("read");

    let report = replay_runpack(&pack);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.outcomes.len(), 2);
}

#[test]
fn script_intents_replay_atomically_by_intent_id() {
    // A multi-step script intent joins one result, like any other intent.
    let mut scripted = draft("run_1");
    scripted.intents = vec![IntentEntry {
        intent_id: "int_script".to_string(),
        sequence: None,
        tool_name: "tool.batch".to_string(),
        intent_digest: digest_bytes(b"int_script").as_str().to_string(),
        request: Some(serde_json::json!({
            "tool_name": "tool.batch",
            "script": {"steps": [
                {"tool_name": "tool.read", "args": {"path": "/tmp/a"}},
                {"tool_name": "tool.write", "args": {"path": "/tmp/b"}}
            ]}
        })),
    }];
    scripted.results = vec![result("int_script", 0)];

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &scripted, &WriteOptions::default()).expect("write");
    let pack = read_runpack(&path).expect("read");

    let report = replay_runpack(&pack);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.outcomes.len(), 1, "the script replays as one intent");

    // Without the single captured result, the whole intent is missing.
    let mut incomplete = scripted;
    incomplete.results.clear();
    write_runpack(&path, &incomplete, &WriteOptions::default()).expect("rewrite");
    let pack = read_runpack(&path).expect("reread");

    let report = replay_runpack(&pack);
    assert_eq!(report.exit_code, 2);
}

#[test]
fn replay_classifies_missing_results_as_exit_two() {
    let mut incomplete = draft("run_1");
    incomplete.results.retain(|result| result.intent_id != "int_2");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &incomplete, &WriteOptions::default()).expect("write");
    let pack = read_runpack(&path).expect("read");

    let report = replay_runpack(&pack);
    assert_eq!(report.exit_code, 2);
    let missing = report
        .outcomes
        .iter()
        .find(|outcome| outcome.intent_id == "int_2")
        .expect("missing outcome present");
    assert_eq!(missing.exit_code, 2);
}

// ============================================================================
// SECTION: Diff
// ============================================================================

#[test]
fn diff_of_identical_packs_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("run.zip");
    write_runpack(&path, &draft("run_1"), &WriteOptions::default()).expect("write");
    let pack = read_runpack(&path).expect("read");

    let diff = diff_runpacks(&pack, &pack).expect("diff");
    assert!(diff.is_empty());
}

#[test]
fn diff_localizes_result_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base_path = dir.path().join("base.zip");
    let cand_path = dir.path().join("candidate.zip");

    write_runpack(&base_path, &draft("run_1"), &WriteOptions::default()).expect("write base");
    let mut changed = draft("run_1");
    changed.results[1] = result("int_2", 1);
    write_runpack(&cand_path, &changed, &WriteOptions::default()).expect("write candidate");

    let base = read_runpack(&base_path).expect("read base");
    let candidate = read_runpack(&cand_path).expect("read candidate");
    let diff = diff_runpacks(&base, &candidate).expect("diff");

    assert!(diff.manifest_changed);
    assert!(diff.results_changed);
    assert!(!diff.intents_changed);
    assert!(!diff.refs_changed);
    assert_eq!(diff.files_changed, vec!["results.jsonl".to_string()]);
}
