//! Moves processed or failed files into their terminal directories.
//!
//! # Design
//! - Prefer an atomic rename; fall back to copy-then-remove only across filesystems.
//! - The copy lands in a hidden temporary sibling and is renamed into place, so
//!   the destination never exposes a partial file.
//! - An existing file with the same name in the destination is replaced.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{FsOpsError, FsOpsResult};

/// Move `source` into `directory`, keeping its file name.
///
/// Returns the destination path.
///
/// # Errors
///
/// Returns [`FsOpsError::Relocate`] if the source is missing or any step of
/// the move fails, and [`FsOpsError::InvalidInput`] if the source has no file name.
pub fn move_into(source: &Path, directory: &Path) -> FsOpsResult<PathBuf> {
    let name = source.file_name().ok_or_else(|| FsOpsError::InvalidInput {
        field: "source_path",
        reason: "missing_file_name",
        value: Some(source.to_string_lossy().into_owned()),
    })?;
    fs::create_dir_all(directory)
        .map_err(|err| FsOpsError::relocate("relocate.create_dir", directory, err))?;
    let destination = directory.join(name);
    move_file(source, &destination, |from, to| fs::rename(from, to))?;
    Ok(destination)
}

/// Async wrapper around [`move_into`] that runs on the blocking pool.
///
/// # Errors
///
/// See [`move_into`].
pub async fn move_into_async(source: PathBuf, directory: PathBuf) -> FsOpsResult<PathBuf> {
    let fallback = source.clone();
    tokio::task::spawn_blocking(move || move_into(&source, &directory))
        .await
        .map_err(|join| {
            FsOpsError::relocate("relocate.join", fallback, io::Error::other(join.to_string()))
        })?
}

/// Move one file using `rename`, copying instead when it reports a cross-device move.
fn move_file(
    source: &Path,
    destination: &Path,
    rename: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> FsOpsResult<()> {
    match rename(source, destination) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                source = %source.display(),
                destination = %destination.display(),
                "rename crossed filesystems; copying"
            );
            copy_then_replace(source, destination)?;
            fs::remove_file(source)
                .map_err(|err| FsOpsError::relocate("relocate.cleanup", source, err))
        }
        Err(err) => Err(FsOpsError::relocate("relocate.rename", source, err)),
    }
}

fn copy_then_replace(source: &Path, destination: &Path) -> FsOpsResult<()> {
    let staging = staging_path(destination);
    let result = (|| {
        fs::copy(source, &staging)
            .map_err(|err| FsOpsError::relocate("relocate.copy", &staging, err))?;
        File::open(&staging)
            .and_then(|file| file.sync_all())
            .map_err(|err| FsOpsError::relocate("relocate.sync", &staging, err))?;
        fs::rename(&staging, destination)
            .map_err(|err| FsOpsError::relocate("relocate.replace", destination, err))
    })();
    if result.is_err()
        && let Err(err) = fs::remove_file(&staging)
        && err.kind() != io::ErrorKind::NotFound
    {
        debug!(staging = %staging.display(), error = %err, "failed to remove staging file");
    }
    result
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.{}.partial", Uuid::new_v4().simple()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn move_into_renames_and_creates_directory() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let inbox = temp.path().join("inbox");
        fs::create_dir_all(&inbox)?;
        let source = inbox.join("report.csv");
        fs::write(&source, b"a,b\n")?;

        let destination = move_into(&source, &temp.path().join("processed"))?;
        assert_eq!(destination, temp.path().join("processed").join("report.csv"));
        assert!(!source.exists());
        assert_eq!(fs::read(&destination)?, b"a,b\n");
        Ok(())
    }

    #[test]
    fn name_collision_replaces_existing_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let processed = temp.path().join("processed");
        fs::create_dir_all(&processed)?;
        fs::write(processed.join("dup.txt"), b"old")?;
        let source = temp.path().join("dup.txt");
        fs::write(&source, b"new")?;

        let destination = move_into(&source, &processed)?;
        assert_eq!(fs::read(destination)?, b"new");
        Ok(())
    }

    #[test]
    fn missing_source_is_relocation_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = move_into(&temp.path().join("ghost"), &temp.path().join("failed"))
            .expect_err("missing source");
        assert!(matches!(
            err,
            FsOpsError::Relocate {
                operation: "relocate.rename",
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn copy_fallback_leaves_no_staging_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src.bin");
        fs::write(&source, b"bytes")?;
        let target_dir = temp.path().join("out");
        fs::create_dir_all(&target_dir)?;
        let destination = target_dir.join("src.bin");

        copy_then_replace(&source, &destination)?;
        assert_eq!(fs::read(&destination)?, b"bytes");
        let leftovers: Vec<_> = fs::read_dir(&target_dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn cross_device_rename_falls_back_to_copy() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("big.iso");
        fs::write(&source, b"payload")?;
        let target_dir = temp.path().join("processed");
        fs::create_dir_all(&target_dir)?;
        let destination = target_dir.join("big.iso");

        move_file(&source, &destination, |_, _| {
            Err(io::Error::from(io::ErrorKind::CrossesDevices))
        })?;
        assert!(!source.exists());
        assert_eq!(fs::read(&destination)?, b"payload");
        let names: Vec<_> = fs::read_dir(&target_dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["big.iso".to_string()]);
        Ok(())
    }

    #[test]
    fn other_rename_errors_skip_the_copy() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("locked.txt");
        fs::write(&source, b"x")?;
        let destination = temp.path().join("locked-out.txt");

        let err = move_file(&source, &destination, |_, _| {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .expect_err("permission denied");
        assert!(matches!(
            err,
            FsOpsError::Relocate {
                operation: "relocate.rename",
                ..
            }
        ));
        assert!(source.exists());
        assert!(!destination.exists());
        Ok(())
    }

    #[tokio::test]
    async fn async_wrapper_moves_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("a.txt");
        fs::write(&source, b"x")?;
        let destination = move_into_async(source.clone(), temp.path().join("failed")).await?;
        assert!(destination.exists());
        assert!(!source.exists());
        Ok(())
    }
}
