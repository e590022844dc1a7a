// crates/gait-core/src/lib.rs
// ============================================================================
// Module: Gait Core Library
// Description: Shared kernel primitives for Gait artifact contracts.
// Purpose: Expose canonical hashing, signing, atomic I/O, and error envelopes.
// Dependencies: crate::{archive, env, error, fsx, hashing, schema, signing, timestamp}
// ============================================================================

//! ## Overview
//! Gait core provides the deterministic primitives every Gait artifact relies
//! on: RFC 8785 canonical JSON digests, Ed25519 detached signatures, atomic
//! file writes with cross-process append locking, deterministic zip
//! emission, classified error envelopes, and the versioned schema registry.
//!
//! The kernel never executes tool side effects; these primitives only render
//! decisions and evidence that callers act on.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod archive;
pub mod env;
pub mod error;
pub mod fsx;
pub mod hashing;
pub mod schema;
pub mod signing;
pub mod timestamp;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archive::ArchiveEntry;
pub use archive::ArchiveError;
pub use archive::MAX_ENTRY_BYTES;
pub use archive::read_zip_bytes;
pub use archive::read_zip_entries;
pub use archive::write_deterministic_zip;
pub use archive::write_deterministic_zip_file;
pub use error::ClassifiedError;
pub use error::ErrorCategory;
pub use error::ErrorEnvelope;
pub use fsx::AppendLock;
pub use fsx::FsxError;
pub use fsx::LockOptions;
pub use fsx::LockProfile;
pub use fsx::append_line_locked;
pub use fsx::validate_archive_entry_path;
pub use fsx::validate_local_path;
pub use fsx::write_file_atomic;
pub use hashing::Digest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::digest_bytes;
pub use hashing::digest_canonical_json;
pub use schema::ArtifactHeader;
pub use schema::SCHEMA_VERSION;
pub use schema::SchemaError;
pub use schema::validate_value;
pub use signing::ArtifactSignature;
pub use signing::KeyMode;
pub use signing::KeyPair;
pub use signing::LoadedKey;
pub use signing::SIGNATURE_ALG;
pub use signing::SigningError;
pub use signing::load_signing_key;
pub use signing::sign_digest_hex;
pub use signing::verify_digest_hex;
pub use timestamp::DETERMINISTIC_EPOCH;
pub use timestamp::TimestampError;
pub use timestamp::age_seconds;
pub use timestamp::normalize_rfc3339;
pub use timestamp::now_rfc3339;
