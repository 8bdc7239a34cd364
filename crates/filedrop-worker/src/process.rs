//! Per-message processing: decode, validate, record, relocate.
//!
//! # Design
//! - Every delivery ends in exactly one [`ProcessingOutcome`]; nothing here is retried.
//! - Validation failures (malformed payload, missing file) leave the filesystem untouched.
//! - Failures after validation move the file to `failed` on a best-effort basis. That
//!   move's own error is logged and dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use filedrop_core::{FileDescriptor, IngestError, IngestResult, ProcessingOutcome};
use filedrop_data::MetadataStore;
use filedrop_fsops::{DirectoryLayout, move_into_async};
use tracing::{info, warn};

/// Turns message bodies into settled outcomes.
pub struct MessageProcessor {
    inbox: PathBuf,
    processed: PathBuf,
    failed: PathBuf,
    store: Arc<dyn MetadataStore>,
}

impl MessageProcessor {
    /// Build a processor for `layout`.
    ///
    /// Descriptors carry canonical paths, so the inbox is canonicalised here when it exists.
    #[must_use]
    pub fn new(layout: &DirectoryLayout, store: Arc<dyn MetadataStore>) -> Self {
        if !store.is_enabled() {
            info!("metadata store disabled");
        }
        Self {
            inbox: std::fs::canonicalize(&layout.inbox).unwrap_or_else(|_| layout.inbox.clone()),
            processed: layout.processed.clone(),
            failed: layout.failed.clone(),
            store,
        }
    }

    /// Process one message body and decide how it settles.
    pub async fn process(&self, body: &[u8]) -> ProcessingOutcome {
        let descriptor = match self.validate(body).await {
            Ok(descriptor) => descriptor,
            Err(error) => return ProcessingOutcome::Rejected { error },
        };

        match self.import(&descriptor).await {
            Ok(destination) => ProcessingOutcome::Processed { destination },
            Err(error) => {
                self.quarantine(descriptor.path()).await;
                ProcessingOutcome::Rejected { error }
            }
        }
    }

    async fn validate(&self, body: &[u8]) -> IngestResult<FileDescriptor> {
        let descriptor = FileDescriptor::decode(body)?;
        let path = descriptor.path();
        if path.parent() != Some(self.inbox.as_path()) {
            return Err(IngestError::InvalidDescriptor {
                field: "path",
                reason: "outside_inbox",
                value: Some(path.display().to_string()),
            });
        }
        match tokio::fs::try_exists(path).await {
            Ok(true) => Ok(descriptor),
            Ok(false) => Err(IngestError::StaleReference {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(IngestError::transient_io("validate.exists", path, source)),
        }
    }

    async fn import(&self, descriptor: &FileDescriptor) -> IngestResult<PathBuf> {
        self.store
            .record(descriptor)
            .await
            .map_err(IngestError::from)?;
        let destination =
            move_into_async(descriptor.path().to_path_buf(), self.processed.clone()).await?;
        Ok(destination)
    }

    async fn quarantine(&self, path: &Path) {
        match move_into_async(path.to_path_buf(), self.failed.clone()).await {
            Ok(destination) => {
                info!(path = %path.display(), destination = %destination.display(), "moved to failed");
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to move file to failed directory");
            }
        }
    }
}
