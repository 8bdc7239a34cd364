//! Test fixtures and environment helpers.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use filedrop_core::FileDescriptor;
use filedrop_fsops::{DirectoryLayout, fingerprint_blocking};
use tempfile::TempDir;

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        if let Some(path) = host.strip_prefix("unix://") {
            return Path::new(path).exists();
        }
        return true;
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .args(["info"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
}

/// Temporary inbox/processed/failed tree removed on drop.
pub struct InboxFixture {
    _root: TempDir,
    layout: DirectoryLayout,
}

impl InboxFixture {
    /// Create the three directories under a fresh temporary root.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("failed to create temp root")?;
        let layout = DirectoryLayout::under(root.path());
        layout.ensure().context("failed to create inbox layout")?;
        Ok(Self {
            _root: root,
            layout,
        })
    }

    /// Directory layout rooted in the fixture.
    #[must_use]
    pub const fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    /// Write `contents` to `name` inside the inbox and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn drop_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.layout.inbox.join(name);
        fs::write(&path, contents).with_context(|| format!("failed to write {name}"))?;
        Ok(path)
    }

    /// Write a file and return the descriptor the watcher would publish for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or hashed.
    pub fn descriptor_for(&self, name: &str, contents: &[u8]) -> Result<FileDescriptor> {
        let path = self.drop_file(name, contents)?;
        fingerprint_blocking(&path).context("failed to fingerprint fixture file")
    }

    /// Names of regular files directly inside `dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn names_in(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Poll `check` until it returns `true` or `timeout` elapses.
///
/// # Errors
///
/// Returns an error naming `what` when the condition never holds.
pub async fn eventually<F>(what: &str, timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
