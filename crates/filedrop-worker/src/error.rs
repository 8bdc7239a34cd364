//! # Design
//!
//! - Process-level failures only; per-message problems become a rejection, never an error here.
//! - Keep error messages constant while carrying context fields for debugging.

use filedrop_broker::BrokerError;
use filedrop_config::ConfigError;
use filedrop_core::error::BoxError;
use filedrop_data::DataError;
use filedrop_fsops::FsOpsError;
use thiserror::Error;

/// Result alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that stop the worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Arguments failed validation.
    #[error("invalid worker configuration")]
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
    /// A configured metadata store could not be opened.
    #[error("metadata store unavailable")]
    MetadataStore {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: DataError,
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

impl WorkerError {
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

impl From<ConfigError> for WorkerError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}
