// crates/gait-runpack/src/lib.rs
// ============================================================================
// Module: Gait Runpack Library
// Description: Deterministic runpack envelopes and the session journal.
// Purpose: Capture agent runs as verifiable, replayable, diffable artifacts.
// Dependencies: crate::{checkpoint, diff, model, reader, replay, session, writer}
// ============================================================================

//! ## Overview
//! A runpack is a deterministic zip capturing one agent run: its manifest,
//! run record, intent and result streams, and context references. This crate
//! writes, reads, verifies, replays, and diffs runpacks, and maintains the
//! append-only session journal with its linked checkpoint chain.
//!
//! All digests chain: per-file SHA-256 into `manifest_digest`, manifest
//! digests into session checkpoints, and checkpoint digests into the chain.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod checkpoint;
pub mod diff;
pub mod model;
pub mod reader;
pub mod replay;
pub mod session;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use checkpoint::ChainReport;
pub use checkpoint::SessionChain;
pub use checkpoint::SessionCheckpoint;
pub use checkpoint::checkpoint_session;
pub use checkpoint::verify_session_chain;
pub use diff::RunpackDiff;
pub use diff::diff_runpacks;
pub use model::CaptureMode;
pub use model::IntentEntry;
pub use model::ManifestFile;
pub use model::ResultEntry;
pub use model::ResultStatus;
pub use model::RunRecord;
pub use model::Runpack;
pub use model::RunpackDraft;
pub use model::RunpackError;
pub use model::RunpackManifest;
pub use model::TimelineEvent;
pub use model::manifest_digest;
pub use reader::SignatureStatus;
pub use reader::VerifyOptions;
pub use reader::VerifyReport;
pub use reader::read_runpack;
pub use reader::verify_zip;
pub use replay::ReplayOutcome;
pub use replay::ReplayReport;
pub use replay::ReplayStatus;
pub use replay::replay_runpack;
pub use session::SessionError;
pub use session::SessionEvent;
pub use session::SessionEventDraft;
pub use session::SessionJournal;
pub use session::SessionState;
pub use session::SessionStatus;
pub use writer::WriteOptions;
pub use writer::write_runpack;
pub use writer::write_runpack_bytes;
