//! Settlement decision for a single consumed message.

use std::path::PathBuf;

use crate::error::IngestError;

/// Terminal state of one delivery; drives the acknowledge/reject call.
#[derive(Debug)]
pub enum ProcessingOutcome {
    /// File relocated into the processed directory (metadata recorded when a store is active).
    Processed {
        /// Final location of the file.
        destination: PathBuf,
    },
    /// Message must be rejected without requeue.
    Rejected {
        /// Failure that caused the rejection.
        error: IngestError,
    },
}

impl ProcessingOutcome {
    /// Whether the delivery should be acknowledged.
    #[must_use]
    pub const fn should_ack(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }

    /// Label used for structured logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl From<IngestError> for ProcessingOutcome {
    fn from(error: IngestError) -> Self {
        Self::Rejected { error }
    }
}
