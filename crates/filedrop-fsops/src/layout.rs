//! Inbox, processed, and failed directories shared by the watcher and worker.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FsOpsError, FsOpsResult};

/// Directories the pipeline reads from and moves files into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Directory watched for new files.
    pub inbox: PathBuf,
    /// Terminal directory for successfully imported files.
    pub processed: PathBuf,
    /// Terminal directory for files whose processing failed.
    pub failed: PathBuf,
}

impl DirectoryLayout {
    /// Build a layout from explicit directories.
    #[must_use]
    pub fn new(
        inbox: impl Into<PathBuf>,
        processed: impl Into<PathBuf>,
        failed: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inbox: inbox.into(),
            processed: processed.into(),
            failed: failed.into(),
        }
    }

    /// Layout with `inbox`, `processed`, and `failed` under a common root.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("inbox"),
            root.join("processed"),
            root.join("failed"),
        )
    }

    /// Create every directory that does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if a directory cannot be created.
    pub fn ensure(&self) -> FsOpsResult<()> {
        for dir in [&self.inbox, &self.processed, &self.failed] {
            fs::create_dir_all(dir).map_err(|err| FsOpsError::io("layout.ensure", dir, err))?;
        }
        Ok(())
    }

    /// Regular, non-hidden files currently present in the inbox, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the inbox cannot be listed.
    pub fn existing_candidates(&self) -> FsOpsResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.inbox)
            .map_err(|err| FsOpsError::io("layout.scan", &self.inbox, err))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FsOpsError::io("layout.scan", &self.inbox, err))?;
            let path = entry.path();
            let is_file = entry.file_type().is_ok_and(|kind| kind.is_file());
            if is_file && is_candidate_name(&path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Whether a path's file name is eligible for ingestion.
///
/// Hidden names (leading `.`) are skipped; this also covers the staging
/// files written during a cross-filesystem move.
#[must_use]
pub fn is_candidate_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| !name.is_empty() && !name.starts_with('.'))
}
