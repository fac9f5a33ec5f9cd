//! Structured error handling and exit codes.

use serde::Serialize;

use crate::compare::CompareError;
use crate::engine::GenerateError;
use crate::manifest::ManifestError;

/// Exit codes for the treesum binary.
///
/// - 0: Success
/// - 1: General error (bad root, bad configuration, unexpected failure)
/// - 2: The manifest could not be opened, written or renamed
/// - 3: Aborted because an algorithm switch was not confirmed
/// - 130: Interrupted by user (Ctrl+C or SIGTERM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The command completed.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Manifest I/O failed.
    ManifestIo = 2,
    /// The run was aborted before any work was done.
    Aborted = 3,
    /// The run was interrupted; the manifest holds what was flushed.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "TS000",
            Self::GeneralError => "TS001",
            Self::ManifestIo => "TS002",
            Self::Aborted => "TS003",
            Self::Interrupted => "TS130",
        }
    }

    /// Pick the exit code for an error returned by [`crate::run_app`].
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<GenerateError>() {
            return match e {
                GenerateError::Interrupted => Self::Interrupted,
                GenerateError::AlgorithmMismatch { .. } => Self::Aborted,
                GenerateError::Manifest(_) => Self::ManifestIo,
                _ => Self::GeneralError,
            };
        }
        if let Some(e) = err.downcast_ref::<CompareError>() {
            return match e {
                CompareError::Manifest(_) => Self::ManifestIo,
                CompareError::Output { .. } => Self::GeneralError,
            };
        }
        if err.downcast_ref::<ManifestError>().is_some() {
            return Self::ManifestIo;
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "TS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
