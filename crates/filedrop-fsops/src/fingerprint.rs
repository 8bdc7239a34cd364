//! Builds the immutable [`FileDescriptor`] for a settled file.
//!
//! # Design
//! - Hashing streams fixed-size chunks on the blocking pool; memory does not grow with file size.
//! - Size and modification time are read after the digest so the descriptor
//!   reflects the bytes that were hashed.
//! - A size change across the hash is reported instead of publishing an inconsistent descriptor.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use filedrop_core::FileDescriptor;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Bytes read per hashing step.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Computes descriptors for stable files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Create a fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hash `path` and capture its metadata without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the file cannot be opened or read,
    /// [`FsOpsError::Changed`] if its size moved while hashing, and
    /// [`FsOpsError::InvalidInput`] for names that are not valid UTF-8.
    pub async fn fingerprint(&self, path: &Path) -> FsOpsResult<FileDescriptor> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || fingerprint_blocking(&owned))
            .await
            .map_err(|join| {
                FsOpsError::io("fingerprint.join", path, io::Error::other(join.to_string()))
            })?
    }
}

/// Hash `path` on the current thread.
///
/// # Errors
///
/// See [`Fingerprinter::fingerprint`].
pub fn fingerprint_blocking(path: &Path) -> FsOpsResult<FileDescriptor> {
    let absolute = fs::canonicalize(path)
        .map_err(|source| FsOpsError::io("fingerprint.canonicalize", path, source))?;
    let before = fs::metadata(&absolute)
        .map_err(|source| FsOpsError::io("fingerprint.metadata", &absolute, source))?;

    let content_hash = sha256_file(&absolute)?;

    let after = fs::metadata(&absolute)
        .map_err(|source| FsOpsError::io("fingerprint.metadata", &absolute, source))?;
    if after.len() != before.len() {
        return Err(FsOpsError::Changed { path: absolute });
    }
    let modified = after
        .modified()
        .map_err(|source| FsOpsError::io("fingerprint.mtime", &absolute, source))?;

    let name = file_name(&absolute)?;
    debug!(path = %absolute.display(), size = after.len(), "fingerprinted file");

    Ok(FileDescriptor {
        content_hash,
        modified_at: epoch_seconds(modified),
        name,
        absolute_path: absolute,
        size_bytes: after.len(),
    })
}

/// Lowercase hex SHA-256 of a file, read in [`CHUNK_SIZE`] steps.
///
/// # Errors
///
/// Returns [`FsOpsError::Io`] if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> FsOpsResult<String> {
    let mut file =
        File::open(path).map_err(|source| FsOpsError::io("fingerprint.open", path, source))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(FsOpsError::io("fingerprint.read", path, source)),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn file_name(path: &Path) -> FsOpsResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| FsOpsError::InvalidInput {
            field: "name",
            reason: "not_utf8",
            value: Some(PathBuf::from(path).to_string_lossy().into_owned()),
        })
}

fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(before_epoch) => -before_epoch.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[tokio::test]
    async fn fingerprint_describes_abc_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("hello.txt");
        fs::write(&path, b"abc")?;

        let descriptor = Fingerprinter::new().fingerprint(&path).await?;
        assert_eq!(descriptor.content_hash, ABC_SHA256);
        assert_eq!(descriptor.size_bytes, 3);
        assert_eq!(descriptor.name, "hello.txt");
        assert!(descriptor.absolute_path.is_absolute());
        assert_eq!(descriptor.absolute_path, fs::canonicalize(&path)?);
        assert!(descriptor.modified_at > 0.0);
        Ok(())
    }

    #[test]
    fn identical_content_yields_identical_digest() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("a.bin");
        let second = temp.path().join("b.bin");
        fs::write(&first, b"payload")?;
        fs::write(&second, b"payload")?;

        let a = fingerprint_blocking(&first)?;
        let b = fingerprint_blocking(&second)?;
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.name, b.name);
        Ok(())
    }

    #[test]
    fn hashes_across_chunk_boundaries() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("large.bin");
        let body = vec![7_u8; CHUNK_SIZE * 2 + 17];
        fs::write(&path, &body)?;

        let expected = hex::encode(Sha256::digest(&body));
        assert_eq!(sha256_file(&path)?, expected);
        Ok(())
    }

    #[test]
    fn empty_file_hashes_to_empty_digest() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("empty");
        fs::write(&path, b"")?;
        let descriptor = fingerprint_blocking(&path)?;
        assert_eq!(descriptor.content_hash, EMPTY_SHA256);
        assert_eq!(descriptor.size_bytes, 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_file_is_io_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = Fingerprinter::new()
            .fingerprint(&temp.path().join("gone.txt"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, FsOpsError::Io { .. }));
        Ok(())
    }
}
