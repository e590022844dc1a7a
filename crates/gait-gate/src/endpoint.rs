// crates/gait-gate/src/endpoint.rs
// ============================================================================
// Module: Endpoint Classification
// Description: Deterministic mapping of targets to endpoint classes.
// Purpose: Let rules constrain egress by class instead of raw target values.
// Dependencies: crate::intent, serde
// ============================================================================

//! ## Overview
//! Endpoint classification maps a target's `(kind, operation)` pair to one
//! of the fixed classes. Unknown pairs classify as `None`; fail-closed
//! constraint paths treat that as a violation rather than guessing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::intent::Target;
use crate::intent::TargetKind;

// ============================================================================
// SECTION: Endpoint Class
// ============================================================================

/// Endpoint classes rules can constrain on.
///
/// # Invariants
/// - Variants are stable for serialization and policy matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointClass {
    /// Filesystem read.
    #[serde(rename = "fs.read")]
    FsRead,
    /// Filesystem write.
    #[serde(rename = "fs.write")]
    FsWrite,
    /// Filesystem delete.
    #[serde(rename = "fs.delete")]
    FsDelete,
    /// Process execution.
    #[serde(rename = "proc.exec")]
    ProcExec,
    /// HTTP network egress.
    #[serde(rename = "net.http")]
    NetHttp,
    /// DNS resolution.
    #[serde(rename = "net.dns")]
    NetDns,
    /// Anything else.
    #[serde(rename = "other")]
    Other,
}

impl EndpointClass {
    /// Returns the stable wire label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FsRead => "fs.read",
            Self::FsWrite => "fs.write",
            Self::FsDelete => "fs.delete",
            Self::ProcExec => "proc.exec",
            Self::NetHttp => "net.http",
            Self::NetDns => "net.dns",
            Self::Other => "other",
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Operations classified as filesystem writes.
const WRITE_OPERATIONS: &[&str] = &["write", "create", "append", "update", "move", "rename"];

/// Operations classified as filesystem deletes.
const DELETE_OPERATIONS: &[&str] = &["delete", "remove", "unlink", "truncate", "destroy"];

/// Operations classified as process execution.
const EXEC_OPERATIONS: &[&str] = &["exec", "execute", "spawn", "run"];

/// Operations classified as DNS resolution.
const DNS_OPERATIONS: &[&str] = &["dns", "resolve", "lookup"];

/// Operations classified as HTTP egress.
const HTTP_OPERATIONS: &[&str] =
    &["http", "get", "post", "put", "patch", "head", "request", "connect"];

/// Classifies a target deterministically; `None` means unknown.
///
/// Unknown classifications must fail closed in constraint paths.
#[must_use]
pub fn classify_endpoint(target: &Target) -> Option<EndpointClass> {
    let operation = target.operation.as_str();
    match target.kind {
        TargetKind::Path => match operation {
            "" | "read" | "stat" | "list" => Some(EndpointClass::FsRead),
            op if WRITE_OPERATIONS.contains(&op) => Some(EndpointClass::FsWrite),
            op if DELETE_OPERATIONS.contains(&op) => Some(EndpointClass::FsDelete),
            op if EXEC_OPERATIONS.contains(&op) => Some(EndpointClass::ProcExec),
            _ => None,
        },
        TargetKind::Host => match operation {
            op if DNS_OPERATIONS.contains(&op) => Some(EndpointClass::NetDns),
            "" => Some(EndpointClass::NetHttp),
            op if HTTP_OPERATIONS.contains(&op) => Some(EndpointClass::NetHttp),
            _ => None,
        },
        TargetKind::Url => match operation {
            op if DNS_OPERATIONS.contains(&op) => Some(EndpointClass::NetDns),
            _ => Some(EndpointClass::NetHttp),
        },
        TargetKind::Other => Some(EndpointClass::Other),
    }
}
