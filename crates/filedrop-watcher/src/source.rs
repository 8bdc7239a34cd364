//! Filesystem event source feeding the ingest loop.
//!
//! # Design
//! - `notify` invokes the handler on its own thread; paths cross into async code
//!   through a bounded channel, so a slow loop applies backpressure to the OS watcher.
//! - Only file creations and renames into the inbox qualify. Directories and hidden names are dropped.
//! - Dropping [`EventSource`] releases the OS subscription.

use std::path::{Path, PathBuf};

use filedrop_fsops::is_candidate_name;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{WatcherError, WatcherResult};

/// Live subscription on the inbox directory.
pub struct EventSource {
    _watcher: RecommendedWatcher,
    sender: mpsc::Sender<PathBuf>,
    directory: PathBuf,
}

impl EventSource {
    /// Subscribe to `directory` (non-recursive) and return the receiving end of the candidate queue.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Watch`] if the OS watcher cannot be created or attached.
    pub fn start(
        directory: &Path,
        capacity: usize,
    ) -> WatcherResult<(Self, mpsc::Receiver<PathBuf>)> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let forward = sender.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if let Some(path) = candidate_path(&event) {
                        debug!(path = %path.display(), "filesystem candidate");
                        if forward.blocking_send(path).is_err() {
                            debug!("candidate queue closed; dropping event");
                        }
                    }
                }
                Err(err) => warn!(error = %err, "filesystem watch error"),
            }
        })
        .map_err(|source| WatcherError::Watch {
            path: directory.to_path_buf(),
            source,
        })?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: directory.to_path_buf(),
                source,
            })?;

        Ok((
            Self {
                _watcher: watcher,
                sender,
                directory: directory.to_path_buf(),
            },
            receiver,
        ))
    }

    /// Directory being watched.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Queue files already present in the inbox without blocking the caller.
    ///
    /// The sends run on a separate task so a backlog larger than the queue
    /// capacity cannot stall startup.
    pub fn seed(&self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }
        let sender = self.sender.clone();
        tokio::spawn(async move {
            for path in paths {
                if sender.send(path).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// Map a notify event onto the inbox path it introduces, if any.
///
/// Backends that cannot tell which side of a rename they saw (FSEvents reports
/// `RenameMode::Any`) qualify only when the path is still a file on disk.
#[must_use]
pub fn candidate_path(event: &Event) -> Option<PathBuf> {
    let path = match event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => event.paths.first(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            event.paths.last()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
            event.paths.last().filter(|path| path.is_file())
        }
        _ => None,
    }?;
    if !is_candidate_name(path) || path.is_dir() {
        return None;
    }
    Some(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use notify::event::{DataChange, RemoveKind};
    use std::time::Duration;

    #[test]
    fn create_and_rename_into_inbox_qualify() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("/inbox/a.csv".into());
        assert_eq!(candidate_path(&created), Some(PathBuf::from("/inbox/a.csv")));

        let moved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/elsewhere/b.csv".into())
            .add_path("/inbox/b.csv".into());
        assert_eq!(candidate_path(&moved), Some(PathBuf::from("/inbox/b.csv")));
    }

    #[test]
    fn other_events_and_hidden_names_are_ignored() {
        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/inbox/a.csv".into());
        assert_eq!(candidate_path(&write), None);

        let removed =
            Event::new(EventKind::Remove(RemoveKind::File)).add_path("/inbox/a.csv".into());
        assert_eq!(candidate_path(&removed), None);

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path("/inbox/a.csv".into());
        assert_eq!(candidate_path(&moved_out), None);

        let hidden =
            Event::new(EventKind::Create(CreateKind::File)).add_path("/inbox/.a.partial".into());
        assert_eq!(candidate_path(&hidden), None);

        let folder = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/inbox/sub".into());
        assert_eq!(candidate_path(&folder), None);
    }

    #[test]
    fn directories_created_as_any_are_ignored() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let event = Event::new(EventKind::Create(CreateKind::Any)).add_path(temp.path().into());
        assert_eq!(candidate_path(&event), None);
        Ok(())
    }

    #[test]
    fn ambiguous_rename_counts_only_when_the_file_is_present() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let arrived = temp.path().join("report.csv");
        std::fs::write(&arrived, b"a,b\n")?;

        let moved_in =
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any))).add_path(arrived.clone());
        assert_eq!(candidate_path(&moved_in), Some(arrived.clone()));

        let other =
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Other))).add_path(arrived.clone());
        assert_eq!(candidate_path(&other), Some(arrived));

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(temp.path().join("gone.csv"));
        assert_eq!(candidate_path(&moved_out), None);
        Ok(())
    }

    #[tokio::test]
    async fn new_file_reaches_the_queue() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (_source, mut receiver) = EventSource::start(temp.path(), 8)?;
        tokio::fs::write(temp.path().join("drop.txt"), b"abc").await?;

        let path = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await?
            .expect("candidate path");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("drop.txt"));
        Ok(())
    }

    #[tokio::test]
    async fn seed_queues_existing_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let (source, mut receiver) = EventSource::start(temp.path(), 1)?;
        source.seed(vec![temp.path().join("a"), temp.path().join("b")]);

        let first = receiver.recv().await.expect("first");
        let second = receiver.recv().await.expect("second");
        assert_eq!(first, temp.path().join("a"));
        assert_eq!(second, temp.path().join("b"));
        Ok(())
    }
}
