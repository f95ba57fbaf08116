// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for the sidecar.
//!
//! Every subsystem returns [`SidecarError`] so the HTTP layer can map failures
//! to the status codes and JSON bodies described in the error-handling design.

use thiserror::Error;

/// Main error type for sidecar operations.
///
/// Each variant corresponds to one entry in the error taxonomy: callers match
/// on the variant to decide retry behavior, and the HTTP layer maps each
/// variant to a fixed status code.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Bad parameters, bad ids, bad protocol frames. Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Registry conflict — an id that must be unique already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Unknown id, or no current browser target.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation requires a terminal state that has not been reached yet.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The OS refused to start a child process. Terminal.
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    /// The shutdown escalation ladder exhausted without observing termination.
    #[error("shutdown timed out: {0}")]
    ShutdownTimeout(String),

    /// Upstream disconnect, full queue, lagged subscriber — retried internally
    /// where safe, otherwise surfaced to the caller.
    #[error("transient error: {0}")]
    Transient(String),

    /// The operation was aborted by the caller or by process shutdown.
    #[error("canceled: {0}")]
    Canceled(String),

    /// I/O error (file operations, device access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results returned by sidecar components.
pub type Result<T> = std::result::Result<T, SidecarError>;

impl SidecarError {
    /// Stable lowercase kind name used in the `{"error": "<kind>", ...}` JSON body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound(_) => "not_found",
            Self::NotReady(_) => "not_ready",
            Self::SpawnFailed(_) => "spawn_failed",
            Self::ShutdownTimeout(_) => "shutdown_timeout",
            Self::Transient(_) => "transient",
            Self::Canceled(_) => "canceled",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = SidecarError::NotReady("recording still in progress".to_string());
        assert_eq!(err.kind(), "not_ready");
        assert!(err.to_string().contains("recording still in progress"));
    }

    #[test]
    fn io_conversion_preserves_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: SidecarError = io_err.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("missing file"));
    }
}
