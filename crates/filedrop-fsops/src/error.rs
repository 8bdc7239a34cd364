//! # Design
//!
//! - Provide structured, constant-message errors for inbox file handling.
//! - Capture operation context (paths, sample counts) to make failures reproducible in tests.
//! - Map onto the pipeline taxonomy at the crate boundary.

use std::io;
use std::path::PathBuf;

use filedrop_core::IngestError;
use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced while settling, hashing, or moving a file.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while inspecting or reading a candidate file.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// IO failures while moving a file between directories.
    #[error("fsops relocation failure")]
    Relocate {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// File size kept changing until the settle timeout elapsed.
    #[error("fsops file did not settle")]
    Unsettled {
        /// Candidate path.
        path: PathBuf,
        /// Samples taken before giving up.
        samples: u32,
    },
    /// File changed between hashing and the final metadata read.
    #[error("fsops file changed while hashing")]
    Changed {
        /// Candidate path.
        path: PathBuf,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Cancellation was requested while waiting.
    #[error("fsops cancelled")]
    Cancelled,
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn relocate(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Relocate {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<FsOpsError> for IngestError {
    fn from(error: FsOpsError) -> Self {
        match error {
            FsOpsError::Io {
                operation,
                path,
                source,
            } => Self::TransientIo {
                operation,
                path,
                source,
            },
            FsOpsError::Relocate {
                operation,
                path,
                source,
            } => Self::Relocation {
                operation,
                path,
                source,
            },
            FsOpsError::Unsettled { path, samples } => Self::Unsettled { path, samples },
            FsOpsError::Changed { path } => Self::TransientIo {
                operation: "fingerprint.verify",
                path,
                source: io::Error::other("file changed while hashing"),
            },
            FsOpsError::InvalidInput {
                field,
                reason,
                value,
            } => Self::InvalidDescriptor {
                field,
                reason,
                value,
            },
            FsOpsError::Cancelled => Self::Cancelled,
        }
    }
}
