//! # Design
//!
//! - Process-level failures only; per-file problems never surface here.
//! - Keep error messages constant while carrying context fields for debugging.

use std::path::PathBuf;

use filedrop_broker::BrokerError;
use filedrop_config::ConfigError;
use filedrop_core::error::BoxError;
use filedrop_fsops::FsOpsError;
use thiserror::Error;

/// Result alias for watcher operations.
pub type WatcherResult<T> = Result<T, WatcherError>;

/// Errors that stop the watcher process.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// Arguments failed validation.
    #[error("invalid watcher configuration")]
    Config {
        /// Source configuration error.
        source: ConfigError,
    },
    /// Telemetry could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: BoxError,
    },
    /// Inbox layout could not be prepared.
    #[error("inbox layout operation failed")]
    Layout {
        /// Operation identifier.
        operation: &'static str,
        /// Source filesystem error.
        source: FsOpsError,
    },
    /// Filesystem notifications could not be subscribed.
    #[error("filesystem watch failed")]
    Watch {
        /// Watched directory.
        path: PathBuf,
        /// Source notify error.
        source: notify::Error,
    },
    /// Broker stayed unreachable after bounded retries.
    #[error("broker unavailable")]
    Broker {
        /// Operation identifier.
        operation: &'static str,
        /// Source broker error.
        source: BrokerError,
    },
}

impl WatcherError {
    pub(crate) fn telemetry(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Telemetry {
            operation,
            source: source.into(),
        }
    }

    pub(crate) const fn broker(operation: &'static str, source: BrokerError) -> Self {
        Self::Broker { operation, source }
    }
}

impl From<ConfigError> for WatcherError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}
