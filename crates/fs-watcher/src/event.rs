//! Normalized filesystem events
//!
//! `notify` reports platform-specific event kinds with varying granularity.
//! Consumers of this crate only care about a small closed set of operations
//! on concrete paths, so raw events are flattened here before they cross
//! the channel boundary.

use notify::{event::ModifyKind, Event as NotifyEvent, EventKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Operation reported for a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsEventKind {
    /// File or directory was created
    Created,
    /// File contents or metadata were written
    Written,
    /// File or directory was removed
    Removed,
    /// File or directory was renamed or moved
    Renamed,
    /// Catch-all for operations consumers ignore
    Other,
}

/// A filesystem event normalized to one affected path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    /// Fan a raw `notify` event out to one `FsEvent` per affected path.
    ///
    /// Rename events carry both sides of the rename; each side becomes its
    /// own event with the same kind.
    pub fn from_notify(event: NotifyEvent) -> Vec<Self> {
        let kind = FsEventKind::from(&event.kind);

        event
            .paths
            .into_iter()
            .map(|path| Self { kind, path })
            .collect()
    }
}

impl From<&EventKind> for FsEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Self::Created,
            EventKind::Modify(ModifyKind::Name(_)) => Self::Renamed,
            EventKind::Modify(_) => Self::Written,
            EventKind::Remove(_) => Self::Removed,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            FsEventKind::from(&EventKind::Create(CreateKind::File)),
            FsEventKind::Created
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            FsEventKind::Written
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            FsEventKind::Written
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            FsEventKind::Renamed
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Remove(RemoveKind::File)),
            FsEventKind::Removed
        );
        assert_eq!(
            FsEventKind::from(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            FsEventKind::Other
        );
    }

    #[test]
    fn test_multi_path_events_fan_out() {
        let raw = NotifyEvent::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/watched/old.txt"))
            .add_path(PathBuf::from("/watched/new.txt"));

        let events = FsEvent::from_notify(raw);

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| event.kind == FsEventKind::Renamed));
        assert_eq!(events[0].path, PathBuf::from("/watched/old.txt"));
        assert_eq!(events[1].path, PathBuf::from("/watched/new.txt"));
    }

    #[test]
    fn test_pathless_event_produces_nothing() {
        let raw = NotifyEvent::new(EventKind::Other);
        assert!(FsEvent::from_notify(raw).is_empty());
    }
}
