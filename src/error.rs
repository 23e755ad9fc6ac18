//! Error taxonomy shared by the acquisition core.
//!
//! Only whole-operation failures are errors. A process that vanished or
//! refused inspection is an ordinary [`Lookup`](crate::backends::process::Lookup)
//! value and never shows up here.

use thiserror::Error;

/// The connection table could not be listed at all.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("connection table unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied reading connection table: {0}")]
    PermissionDenied(String),

    #[error("failed to run `{command}`: {reason}")]
    Command { command: String, reason: String },

    #[error("could not parse output of `{command}`: {reason}")]
    Parse { command: String, reason: String },
}

/// A poll cycle failed. Wraps the enumerator error at the builder boundary.
#[derive(Debug, Error)]
#[error("snapshot acquisition failed: {0}")]
pub struct AcquisitionError(#[from] pub EnumerationError);

/// Failure of the OS terminate primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TerminateError {
    #[error("process {0} does not exist")]
    NotFound(u32),

    #[error("permission denied signalling process {0}")]
    PermissionDenied(u32),

    #[error("refusing to signal pid {pid}: {reason}")]
    Refused { pid: u32, reason: String },

    #[error("failed to signal process {pid}: {reason}")]
    Os { pid: u32, reason: String },
}
