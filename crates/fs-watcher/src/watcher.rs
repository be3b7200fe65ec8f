//! Directory watch handle
//!
//! Bridges `notify`'s callback API into async channels. The callback runs
//! on the backend's own thread; both channels are unbounded so a send can
//! never park that thread.

use crate::event::FsEvent;
use async_channel as chan;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, trace};

/// Errors produced while opening a watch or reported by the OS
/// notification facility mid-run.
///
/// `notify::Error` is not `Clone`, but these errors travel on broadcast
/// channels downstream, so the sources are shared behind `Arc`.
#[derive(Debug, Clone, Error)]
pub enum WatcherError {
    #[error("unable to initialize filesystem watcher: {0}")]
    Init(Arc<notify::Error>),

    #[error("unable to watch directory {path}: {source}")]
    Watch {
        path: PathBuf,
        source: Arc<notify::Error>,
    },

    #[error("filesystem watcher backend error: {0}")]
    Backend(Arc<notify::Error>),
}

/// Owns one non-recursive directory watch.
///
/// Events and backend errors arrive on independent unbounded streams.
/// Closing (or dropping) the watcher drops the channel senders held by the
/// backend callback, which closes both streams.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    path: PathBuf,
    events: chan::Receiver<FsEvent>,
    errors: chan::Receiver<WatcherError>,
}

impl DirectoryWatcher {
    /// Open a non-recursive watch on `path`.
    ///
    /// The directory itself must exist; the files of interest inside it do
    /// not have to.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WatcherError> {
        let path = path.as_ref().to_path_buf();

        let (events_tx, events_rx) = chan::unbounded();
        let (errors_tx, errors_rx) = chan::unbounded();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    for event in FsEvent::from_notify(event) {
                        if events_tx.send_blocking(event).is_err() {
                            trace!("filesystem event dropped, stream already closed");
                        }
                    }
                }
                Err(e) => {
                    if errors_tx
                        .send_blocking(WatcherError::Backend(Arc::new(e)))
                        .is_err()
                    {
                        trace!("watcher error dropped, stream already closed");
                    }
                }
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(Arc::new(e)))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch {
                path: path.clone(),
                source: Arc::new(e),
            })?;

        trace!(path = %path.display(), "now watching directory");

        Ok(Self {
            watcher,
            path,
            events: events_rx,
            errors: errors_rx,
        })
    }

    /// Stream of normalized events for paths inside the watched directory.
    pub fn events(&self) -> chan::Receiver<FsEvent> {
        self.events.clone()
    }

    /// Stream of errors reported by the OS notification facility.
    pub fn errors(&self) -> chan::Receiver<WatcherError> {
        self.errors.clone()
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the OS watch and close both streams.
    pub fn close(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.path) {
            // The OS may have dropped the watch on its own, e.g. when the
            // watched directory was deleted
            error!(?e, path = %self.path.display(), "unable to unwatch directory");
        }

        trace!(path = %self.path.display(), "watcher closed");
    }
}
