//! # Design
//!
//! - One taxonomy for every per-file and per-message failure in the pipeline.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Collaborator errors (broker, metadata store) are boxed so this crate stays a leaf.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed collaborator error carried by the broker and metadata store variants.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias for pipeline operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Failures raised while capturing, publishing, or consuming a file.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File unreadable or vanished during the stability check or fingerprinting.
    #[error("file unreadable or vanished")]
    TransientIo {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path of the candidate file.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// File never settled within the allotted window.
    #[error("file did not settle")]
    Unsettled {
        /// Path of the candidate file.
        path: PathBuf,
        /// Number of size samples taken before giving up.
        samples: u32,
    },
    /// File referenced by a message no longer exists.
    #[error("referenced file no longer exists")]
    StaleReference {
        /// Path carried by the message.
        path: PathBuf,
    },
    /// Broker could not be reached or refused the operation.
    #[error("broker unavailable")]
    BrokerUnavailable {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying broker error.
        source: BoxError,
    },
    /// Message payload could not be encoded or decoded.
    #[error("malformed descriptor payload")]
    Serialization {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// Payload decoded but violated a descriptor invariant.
    #[error("descriptor payload failed validation")]
    InvalidDescriptor {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Metadata store was configured but the write failed.
    #[error("metadata store unavailable")]
    MetadataStoreUnavailable {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying store error.
        source: BoxError,
    },
    /// File could not be moved into its destination directory.
    #[error("file relocation failed")]
    Relocation {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Shutdown was requested while the operation was waiting.
    #[error("operation cancelled")]
    Cancelled,
}

impl IngestError {
    /// Build a transient IO failure for a candidate file.
    pub fn transient_io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::TransientIo {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap a broker error.
    pub fn broker(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::BrokerUnavailable {
            operation,
            source: source.into(),
        }
    }

    /// Wrap a metadata store error.
    pub fn metadata_store(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::MetadataStoreUnavailable {
            operation,
            source: source.into(),
        }
    }

    /// Build a relocation failure.
    pub fn relocation(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Relocation {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Stable label used in log fields and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransientIo { .. } => "transient_io",
            Self::Unsettled { .. } => "unsettled",
            Self::StaleReference { .. } => "stale_reference",
            Self::BrokerUnavailable { .. } => "broker_unavailable",
            Self::Serialization { .. } | Self::InvalidDescriptor { .. } => "serialization",
            Self::MetadataStoreUnavailable { .. } => "metadata_store_unavailable",
            Self::Relocation { .. } => "relocation",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the error concerns the broker connection rather than a single input.
    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        matches!(self, Self::BrokerUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    #[test]
    fn kind_labels_cover_taxonomy() {
        let io_err = IngestError::transient_io("stat", "/inbox/a", io::Error::other("io"));
        assert_eq!(io_err.kind(), "transient_io");
        assert!(io_err.source().is_some());

        let stale = IngestError::StaleReference {
            path: PathBuf::from("/inbox/a"),
        };
        assert_eq!(stale.kind(), "stale_reference");
        assert!(!stale.is_connection_level());

        let broker = IngestError::broker("publish", io::Error::other("refused"));
        assert_eq!(broker.kind(), "broker_unavailable");
        assert!(broker.is_connection_level());

        let serde_err = IngestError::Serialization {
            operation: "decode",
            source: serde_json::Error::custom("bad"),
        };
        let invalid = IngestError::InvalidDescriptor {
            field: "content_hash",
            reason: "not_hex",
            value: None,
        };
        assert_eq!(serde_err.kind(), invalid.kind());

        let store = IngestError::metadata_store("insert", io::Error::other("down"));
        assert_eq!(store.kind(), "metadata_store_unavailable");
        assert_eq!(store.to_string(), "metadata store unavailable");
    }
}
