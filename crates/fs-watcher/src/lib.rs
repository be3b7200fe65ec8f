//! Single-directory filesystem watcher.
//!
//! Wraps the `notify` OS notification facility behind a small async
//! surface: [`DirectoryWatcher::open`] registers a non-recursive watch on
//! one directory and exposes two independent streams, one for normalized
//! [`FsEvent`]s and one for backend [`WatcherError`]s. Both streams close
//! when the watcher is closed or dropped, which is the exit signal for any
//! consumer loop.

mod event;
mod watcher;

pub use event::{FsEvent, FsEventKind};
pub use watcher::{DirectoryWatcher, WatcherError};
