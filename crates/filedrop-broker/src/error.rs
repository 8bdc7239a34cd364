//! # Design
//!
//! - Broker failures are connection-level: callers reconnect rather than settle a message.
//! - Messages stay constant; the failing operation is carried as a field.

use filedrop_core::IngestError;
use filedrop_core::error::BoxError;
use thiserror::Error;

/// Result alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors surfaced by broker implementations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Transport or protocol failure reported by the broker client.
    #[error("broker operation failed")]
    Operation {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying client error.
        source: BoxError,
    },
    /// Connection or channel was closed underneath the caller.
    #[error("broker connection closed")]
    Closed {
        /// Operation that observed the closure.
        operation: &'static str,
    },
    /// Reconnect attempts were exhausted.
    #[error("broker retries exhausted")]
    Exhausted {
        /// Operation that was being retried.
        operation: &'static str,
        /// Attempts made before giving up.
        attempts: u32,
        /// Error from the final attempt.
        source: Box<BrokerError>,
    },
    /// Cancellation was requested while waiting to retry.
    #[error("broker wait cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Wrap a client error with the operation that produced it.
    pub fn operation(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Operation {
            operation,
            source: source.into(),
        }
    }

    /// Operation label for logs.
    #[must_use]
    pub const fn operation_label(&self) -> &'static str {
        match self {
            Self::Operation { operation, .. }
            | Self::Closed { operation }
            | Self::Exhausted { operation, .. } => operation,
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<BrokerError> for IngestError {
    fn from(error: BrokerError) -> Self {
        match error {
            BrokerError::Cancelled => Self::Cancelled,
            other => Self::BrokerUnavailable {
                operation: other.operation_label(),
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn broker_errors_are_connection_level() {
        let err: IngestError = BrokerError::operation("publish", io::Error::other("down")).into();
        assert!(err.is_connection_level());
        assert_eq!(err.kind(), "broker_unavailable");

        let exhausted = BrokerError::Exhausted {
            operation: "connect",
            attempts: 5,
            source: Box::new(BrokerError::Closed {
                operation: "connect",
            }),
        };
        assert_eq!(exhausted.operation_label(), "connect");
        assert_eq!(IngestError::from(BrokerError::Cancelled).kind(), "cancelled");
    }
}
