//! Event classification
//!
//! Maps raw directory events onto lockfile-state transitions. Only events
//! for the target path matter; the comparison is case-insensitive because
//! Windows reports paths with inconsistent casing.

use rl_fs_watcher::{FsEvent, FsEventKind};
use std::path::{Path, PathBuf};

/// Lockfile-state transition derived from one filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockfileChange {
	/// The file was written (or created); its contents must be re-parsed.
	Rewritten,
	/// The file was removed.
	Removed,
}

/// Filters raw directory events down to the single file of interest.
#[derive(Debug, Clone)]
pub struct EventClassifier {
	target: PathBuf,
}

impl EventClassifier {
	pub fn new(target: impl Into<PathBuf>) -> Self {
		Self {
			target: target.into(),
		}
	}

	/// Classify one raw event.
	///
	/// `None` means the event is irrelevant: it concerns another path, or
	/// an operation the lockfile state does not depend on. Renames are
	/// deliberately ignored; the producer only ever creates, rewrites and
	/// deletes the lockfile in place.
	pub fn classify(&self, event: &FsEvent) -> Option<LockfileChange> {
		if !paths_equal_fold(&event.path, &self.target) {
			return None;
		}

		match event.kind {
			FsEventKind::Created | FsEventKind::Written => Some(LockfileChange::Rewritten),
			FsEventKind::Removed => Some(LockfileChange::Removed),
			FsEventKind::Renamed | FsEventKind::Other => None,
		}
	}
}

/// Case-insensitive path equality.
fn paths_equal_fold(a: &Path, b: &Path) -> bool {
	a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event(kind: FsEventKind, path: &str) -> FsEvent {
		FsEvent {
			kind,
			path: PathBuf::from(path),
		}
	}

	#[test]
	fn test_written_target_requires_reparse() {
		let classifier = EventClassifier::new("/riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Written, "/riot/Config/lockfile")),
			Some(LockfileChange::Rewritten)
		);
	}

	#[test]
	fn test_created_target_behaves_as_written() {
		let classifier = EventClassifier::new("/riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Created, "/riot/Config/lockfile")),
			Some(LockfileChange::Rewritten)
		);
	}

	#[test]
	fn test_removed_target_clears_state() {
		let classifier = EventClassifier::new("/riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Removed, "/riot/Config/lockfile")),
			Some(LockfileChange::Removed)
		);
	}

	#[test]
	fn test_path_comparison_is_case_insensitive() {
		let classifier = EventClassifier::new("C:/Riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Written, "c:/riot/config/LOCKFILE")),
			Some(LockfileChange::Rewritten)
		);
	}

	#[test]
	fn test_sibling_paths_are_discarded() {
		let classifier = EventClassifier::new("/riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Written, "/riot/Config/settings.yaml")),
			None
		);
		assert_eq!(
			classifier.classify(&event(FsEventKind::Removed, "/riot/Config/lockfile.bak")),
			None
		);
	}

	#[test]
	fn test_renames_and_other_operations_are_ignored() {
		let classifier = EventClassifier::new("/riot/Config/lockfile");

		assert_eq!(
			classifier.classify(&event(FsEventKind::Renamed, "/riot/Config/lockfile")),
			None
		);
		assert_eq!(
			classifier.classify(&event(FsEventKind::Other, "/riot/Config/lockfile")),
			None
		);
	}
}
