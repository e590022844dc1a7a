// crates/gait-guard/tests/guard.rs
// ============================================================================
// Module: Evidence Pack Tests
// Description: Verifies pack assembly, verification, and tamper detection.
// ============================================================================
//! ## Overview
//! Built packs must verify; removing a declared file must surface in
//! `missing_files` without shrinking `files_checked`; signatures must bind
//! the pack digest; inventory caching must respect source mtimes.

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
use std::path::Path;
use std::path::PathBuf;

use gait_context::RunRefs;
use gait_core::archive::ArchiveEntry;
use gait_core::archive::read_zip_entries;
use gait_core::archive::write_deterministic_zip_file;
use gait_core::hashing::digest_bytes;
use gait_core::schema::ArtifactHeader;
use gait_core::schema::ids;
use gait_core::signing::KeyPair;
use gait_guard::BuildPackOptions;
use gait_guard::PackSignatureStatus;
use gait_guard::PackVerifyOptions;
use gait_guard::build_pack;
use gait_guard::load_inventory;
use gait_guard::snapshot_directory;
use gait_guard::verify_pack;
use gait_runpack::IntentEntry;
use gait_runpack::ResultEntry;
use gait_runpack::ResultStatus;
use gait_runpack::RunRecord;
use gait_runpack::RunpackDraft;
use gait_runpack::WriteOptions;
use gait_runpack::write_runpack;

/// Writes a minimal runpack and returns its path.
fn write_source_runpack(dir: &Path) -> PathBuf {
    let draft = RunpackDraft {
        run: RunRecord {
            header: ArtifactHeader::deterministic(ids::RUNPACK_RUN),
            run_id: "run_guard".to_string(),
            env: BTreeMap::new(),
            timeline: Vec::new(),
        },
        intents: vec![IntentEntry {
            intent_id: "int_1".to_string(),
            sequence: None,
            tool_name: "tool.read".to_string(),
            intent_digest: digest_bytes(b"int_1").as_str().to_string(),
            request: None,
        }],
        results: vec![ResultEntry {
            intent_id: "int_1".to_string(),
            status: ResultStatus::Ok,
            exit_code: Some(0),
            result_digest: String::new(),
            output: None,
            error: None,
            observed_at: "2026-03-01T12:00:00Z".to_string(),
        }],
        refs: RunRefs::empty(),
        context_envelope: None,
    };
    let path = dir.join("run.zip");
    write_runpack(&path, &draft, &WriteOptions::default()).expect("write runpack");
    path
}

#[test]
fn built_pack_verifies_and_derives_pack_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let output = dir.path().join("evidence.zip");

    let options = BuildPackOptions {
        runpack_path: runpack,
        ..BuildPackOptions::default()
    };
    let manifest = build_pack(&output, &options).expect("build pack");
    assert!(manifest.pack_id.starts_with("pack_"));
    assert_eq!(manifest.pack_id.len(), "pack_".len() + 16);
    assert_eq!(manifest.run_id, "run_guard");

    let report = verify_pack(&output, &PackVerifyOptions::default()).expect("verify");
    assert!(report.passed);
    assert_eq!(report.pack_id, manifest.pack_id);
    assert!(report.missing_files.is_empty());
    assert!(report.hash_mismatches.is_empty());
    assert_eq!(report.signature_status, PackSignatureStatus::Missing);
}

#[test]
fn identical_inputs_build_identical_packs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());

    let first_path = dir.path().join("first.zip");
    let second_path = dir.path().join("second.zip");
    let options = BuildPackOptions {
        runpack_path: runpack,
        ..BuildPackOptions::default()
    };
    build_pack(&first_path, &options).expect("first");
    build_pack(&second_path, &options).expect("second");

    let first = std::fs::read(&first_path).expect("read first");
    let second = std::fs::read(&second_path).expect("read second");
    assert_eq!(first, second, "pack emission must be byte deterministic");
}

// ============================================================================
// SECTION: Scenario S8 — Pack Verify Missing File
// ============================================================================

#[test]
fn removed_declared_file_is_reported_without_shrinking_checks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let output = dir.path().join("evidence.zip");
    let options = BuildPackOptions {
        runpack_path: runpack,
        ..BuildPackOptions::default()
    };
    build_pack(&output, &options).expect("build pack");

    let baseline = verify_pack(&output, &PackVerifyOptions::default()).expect("baseline verify");

    // Rewrite the archive without one declared summary file.
    let mut entries = read_zip_entries(&output).expect("entries");
    entries.remove("runpack_summary.json");
    let rewritten: Vec<ArchiveEntry> = entries
        .iter()
        .map(|(name, bytes)| ArchiveEntry::new(name.clone(), bytes.clone()))
        .collect();
    write_deterministic_zip_file(&output, &rewritten).expect("rewrite");

    let report = verify_pack(&output, &PackVerifyOptions::default()).expect("verify");
    assert!(!report.passed);
    assert_eq!(report.missing_files, vec!["runpack_summary.json".to_string()]);
    assert_eq!(
        report.files_checked, baseline.files_checked,
        "files_checked counts declared files, not found files"
    );
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

#[test]
fn signed_pack_verifies_with_key_and_fails_with_wrong_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let output = dir.path().join("evidence.zip");
    let key = KeyPair::generate();

    let options = BuildPackOptions {
        runpack_path: runpack,
        signing_key: Some(&key),
        ..BuildPackOptions::default()
    };
    build_pack(&output, &options).expect("build pack");

    let verifying = key.verifying_key();
    let report = verify_pack(
        &output,
        &PackVerifyOptions {
            require_signature: true,
            verifying_key: Some(&verifying),
        },
    )
    .expect("verify signed");
    assert!(report.passed);
    assert_eq!(report.signature_status, PackSignatureStatus::Verified);
    assert_eq!(report.signatures_total, 1);
    assert_eq!(report.signatures_valid, 1);

    let wrong = KeyPair::generate().verifying_key();
    let report = verify_pack(
        &output,
        &PackVerifyOptions {
            require_signature: true,
            verifying_key: Some(&wrong),
        },
    )
    .expect("verify wrong key");
    assert!(!report.passed);
    assert_eq!(report.signature_status, PackSignatureStatus::Failed);
    assert!(!report.signature_errors.is_empty());
}

#[test]
fn unsigned_pack_fails_when_signature_is_required() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let output = dir.path().join("evidence.zip");
    let options = BuildPackOptions {
        runpack_path: runpack,
        ..BuildPackOptions::default()
    };
    build_pack(&output, &options).expect("build pack");

    let report = verify_pack(
        &output,
        &PackVerifyOptions {
            require_signature: true,
            verifying_key: None,
        },
    )
    .expect("verify");
    assert!(!report.passed);
}

// ============================================================================
// SECTION: Extra Evidence
// ============================================================================

#[test]
fn unsafe_extra_entry_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let evidence = dir.path().join("note.txt");
    std::fs::write(&evidence, b"context").expect("write evidence");

    for name in ["../escape.txt", "/abs.txt"] {
        let options = BuildPackOptions {
            runpack_path: runpack.clone(),
            extra_files: vec![(name.to_string(), evidence.clone())],
            ..BuildPackOptions::default()
        };
        assert!(
            build_pack(&dir.path().join("evidence.zip"), &options).is_err(),
            "entry name {name} must be rejected"
        );
    }
}

#[test]
fn approval_records_are_validated_and_embedded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let output = dir.path().join("evidence.zip");

    let approval = serde_json::json!({
        "approval_id": "appr_1",
        "intent_digest": digest_bytes(b"intent").as_str(),
        "decision": "approved",
        "approver": "security-oncall",
        "decided_at": "2026-03-01T12:00:00Z"
    });
    let options = BuildPackOptions {
        runpack_path: runpack.clone(),
        approval_records: vec![approval],
        ..BuildPackOptions::default()
    };
    let manifest = build_pack(&output, &options).expect("build pack");
    assert!(manifest.files.iter().any(|file| file.path == "approval_audit_0.json"));

    // A record missing required fields is rejected before anything is written.
    let malformed = serde_json::json!({"decision": "approved"});
    let options = BuildPackOptions {
        runpack_path: runpack,
        approval_records: vec![malformed],
        ..BuildPackOptions::default()
    };
    assert!(build_pack(&dir.path().join("bad.zip"), &options).is_err());
}

#[test]
fn extra_files_land_in_the_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runpack = write_source_runpack(dir.path());
    let evidence = dir.path().join("summary.pdf");
    std::fs::write(&evidence, b"%PDF-1.4 stub").expect("write evidence");
    let output = dir.path().join("evidence.zip");

    let options = BuildPackOptions {
        runpack_path: runpack,
        extra_files: vec![("summary.pdf".to_string(), evidence)],
        ..BuildPackOptions::default()
    };
    let manifest = build_pack(&output, &options).expect("build pack");
    assert!(manifest.files.iter().any(|file| file.path == "summary.pdf"));

    let report = verify_pack(&output, &PackVerifyOptions::default()).expect("verify");
    assert!(report.passed);
}

// ============================================================================
// SECTION: Inventory Cache
// ============================================================================

#[test]
fn directory_snapshot_is_sorted_and_digested() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("workspace");
    std::fs::create_dir_all(root.join("sub")).expect("mkdir");
    std::fs::write(root.join("b.txt"), b"beta").expect("write b");
    std::fs::write(root.join("a.txt"), b"alpha").expect("write a");
    std::fs::write(root.join("sub/c.txt"), b"gamma").expect("write c");

    let snapshot = snapshot_directory(&root).expect("snapshot");
    let paths: Vec<_> = snapshot.entries.iter().map(|entry| entry.path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt", "sub/c.txt"]);
    assert_eq!(snapshot.entries[0].sha256, digest_bytes(b"alpha").as_str());
}

#[test]
fn inventory_cache_returns_same_snapshot_until_mtime_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("workspace");
    std::fs::create_dir_all(&root).expect("mkdir");
    std::fs::write(root.join("a.txt"), b"alpha").expect("write");

    let snapshot = snapshot_directory(&root).expect("snapshot");
    let snapshot_path = dir.path().join("inventory.json");
    std::fs::write(&snapshot_path, serde_json::to_vec(&snapshot).expect("serialize"))
        .expect("write snapshot");

    let first = load_inventory(&snapshot_path).expect("first load");
    let second = load_inventory(&snapshot_path).expect("second load");
    assert!(
        std::sync::Arc::ptr_eq(&first, &second),
        "unchanged sources must hit the cache"
    );
}
