//! Watch session lifecycle
//!
//! One session owns one directory watch plus the lockfile state derived
//! from it. Filesystem events, watcher errors and the stop signal are
//! multiplexed in a single blocking multi-wait on a dedicated task; a
//! second task drains the error channel into the log for the lifetime of
//! the session.
//!
//! Shutdown policy is drain-then-stop: the multi-wait is biased towards
//! the event stream, so a burst of events already queued when the stop
//! signal arrives is fully classified before the loop exits, and an
//! in-flight parse always completes. `stop` returns only after both tasks
//! have terminated and the OS watch has been released.

mod classifier;

pub use classifier::{EventClassifier, LockfileChange};

use crate::{
	config::{ConfigError, LockfilePaths},
	lockfile::{Lockfile, LockfileError},
};

use std::path::PathBuf;

use async_channel as chan;
use rl_fs_watcher::{DirectoryWatcher, FsEvent, WatcherError};
use thiserror::Error;
use tokio::{
	sync::{broadcast, watch},
	task::JoinHandle,
};
use tracing::{debug, error, info, trace, warn};

/// Capacity of the availability and error broadcast channels. A consumer
/// that lags loses the oldest notifications instead of ever stalling the
/// event loop.
const NOTIFY_BUFFER: usize = 64;

/// Availability notification delivered to consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum LockfileState {
	/// A fresh record was parsed from the lockfile.
	Available(Lockfile),
	/// The lockfile is gone or unreadable.
	Absent,
}

impl LockfileState {
	/// The boolean availability signal this notification encodes.
	pub fn is_available(&self) -> bool {
		matches!(self, Self::Available(_))
	}
}

/// Errors published on the session error channel.
#[derive(Debug, Clone, Error)]
pub enum WatchError {
	#[error("filesystem watcher error: {0}")]
	Watcher(#[from] WatcherError),

	#[error(transparent)]
	Lockfile(#[from] LockfileError),
}

/// Lifecycle errors returned by [`WatchSession::start`] and
/// [`WatchSession::stop`].
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("tried to start an already started watch session")]
	AlreadyStarted,

	#[error("tried to stop a watch session that is not running")]
	NotRunning,

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("unable to watch config directory: {0}")]
	Watch(#[from] WatcherError),
}

/// Lifecycle phase of a [`WatchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	Idle,
	Running,
	Stopping,
	/// Terminal; construct a fresh session to watch again.
	Stopped,
}

/// Owns one active directory watch and the lockfile state derived from it.
///
/// Consumers observe the session through [`WatchSession::subscribe`],
/// [`WatchSession::subscribe_errors`] and the [`WatchSession::current`]
/// snapshot; they never hold references into session state. All lockfile
/// state is written by the event-consumption task alone, so the session
/// needs no locks.
pub struct WatchSession {
	paths: LockfilePaths,
	phase: Phase,
	watcher: Option<DirectoryWatcher>,
	stop_tx: Option<chan::Sender<()>>,
	consumer: Option<JoinHandle<()>>,
	logger: Option<JoinHandle<()>>,
	state_tx: broadcast::Sender<LockfileState>,
	error_tx: Option<broadcast::Sender<WatchError>>,
	current_tx: Option<watch::Sender<Option<Lockfile>>>,
	current_rx: watch::Receiver<Option<Lockfile>>,
}

impl WatchSession {
	/// Session watching the platform Riot Client config directory.
	pub fn new() -> Result<Self, SessionError> {
		Ok(Self::with_paths(LockfilePaths::resolve()?))
	}

	/// Session watching explicitly supplied paths (tests, `--config-dir`).
	pub fn with_paths(paths: LockfilePaths) -> Self {
		let (state_tx, _) = broadcast::channel(NOTIFY_BUFFER);
		let (error_tx, _) = broadcast::channel(NOTIFY_BUFFER);
		let (current_tx, current_rx) = watch::channel(None);

		Self {
			paths,
			phase: Phase::Idle,
			watcher: None,
			stop_tx: None,
			consumer: None,
			logger: None,
			state_tx,
			error_tx: Some(error_tx),
			current_tx: Some(current_tx),
			current_rx,
		}
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	pub fn paths(&self) -> &LockfilePaths {
		&self.paths
	}

	/// Availability notifications, in classification order.
	pub fn subscribe(&self) -> broadcast::Receiver<LockfileState> {
		self.state_tx.subscribe()
	}

	/// Watcher and lockfile errors, for diagnostics.
	///
	/// On a stopped session this hands out an already-closed receiver.
	pub fn subscribe_errors(&self) -> broadcast::Receiver<WatchError> {
		match &self.error_tx {
			Some(error_tx) => error_tx.subscribe(),
			None => {
				let (_closed_tx, closed_rx) = broadcast::channel(1);
				closed_rx
			}
		}
	}

	/// Immutable snapshot of the most recently parsed record, `None` while
	/// the lockfile is absent or unparseable.
	pub fn current(&self) -> Option<Lockfile> {
		self.current_rx.borrow().clone()
	}

	/// Open the directory watch and launch the background tasks.
	///
	/// Valid only from [`Phase::Idle`]; starting twice is a programming
	/// error and fails fast. A directory that cannot be watched is fatal:
	/// the error is published on the error channel and returned, and the
	/// session does not transition to [`Phase::Running`].
	pub fn start(&mut self) -> Result<(), SessionError> {
		if self.phase != Phase::Idle {
			return Err(SessionError::AlreadyStarted);
		}

		let error_tx = self
			.error_tx
			.clone()
			.expect("idle session owns the error channel");

		let watcher = match DirectoryWatcher::open(&self.paths.config_dir) {
			Ok(watcher) => watcher,
			Err(e) => {
				error!(
					dir = %self.paths.config_dir.display(),
					"unable to watch config directory: {e}",
				);
				let _ = error_tx.send(WatchError::Watcher(e.clone()));
				return Err(e.into());
			}
		};

		let (stop_tx, stop_rx) = chan::bounded(1);

		let event_loop = EventLoop {
			classifier: EventClassifier::new(&self.paths.lockfile),
			lockfile_path: self.paths.lockfile.clone(),
			state_tx: self.state_tx.clone(),
			error_tx: error_tx.clone(),
			current_tx: self
				.current_tx
				.take()
				.expect("idle session owns the snapshot channel"),
		};

		self.consumer = Some(tokio::spawn(event_loop.run(
			watcher.events(),
			watcher.errors(),
			stop_rx,
		)));

		// Error log loop: lives until the error channel closes during stop
		let mut error_rx = error_tx.subscribe();
		self.logger = Some(tokio::spawn(async move {
			loop {
				match error_rx.recv().await {
					Ok(e) => error!("watch error: {e}"),
					Err(broadcast::error::RecvError::Closed) => break,
					Err(broadcast::error::RecvError::Lagged(n)) => {
						warn!("error log loop lagged by {n} notifications");
					}
				}
			}

			trace!("error log loop finished");
		}));

		self.watcher = Some(watcher);
		self.stop_tx = Some(stop_tx);
		self.phase = Phase::Running;

		info!(dir = %self.paths.config_dir.display(), "watch session running");

		Ok(())
	}

	/// Signal the event loop to stop and wait for the session to wind
	/// down.
	///
	/// Valid only from [`Phase::Running`]; stopping before starting or
	/// twice is a programming error and fails fast. Returns only after
	/// the event loop has acknowledged termination, the OS watch has been
	/// released exactly once and the error log loop has ended. No event
	/// is classified past that point.
	pub async fn stop(&mut self) -> Result<(), SessionError> {
		if self.phase != Phase::Running {
			return Err(SessionError::NotRunning);
		}
		self.phase = Phase::Stopping;

		info!("stopping watch session");

		// A degraded session's event loop has already exited and dropped
		// its stop receiver; the failed send is fine either way
		if let Some(stop_tx) = self.stop_tx.take() {
			let _ = stop_tx.send(()).await;
		}

		// Synchronization barrier on the event-consumption task
		if let Some(consumer) = self.consumer.take() {
			if let Err(e) = consumer.await {
				error!(?e, "failed to join event loop task");
			}
		}

		// Single release point for the OS watch
		if let Some(watcher) = self.watcher.take() {
			watcher.close();
		}

		// Closing the error channel is what ends the log loop; the event
		// loop's sender clone is already gone by this point
		self.error_tx = None;
		if let Some(logger) = self.logger.take() {
			if let Err(e) = logger.await {
				error!(?e, "failed to join error log loop");
			}
		}

		self.phase = Phase::Stopped;

		info!("watch session stopped");

		Ok(())
	}
}

/// State owned by the event-consumption task. Nothing else writes the
/// current lockfile or the snapshot channel.
struct EventLoop {
	classifier: EventClassifier,
	lockfile_path: PathBuf,
	state_tx: broadcast::Sender<LockfileState>,
	error_tx: broadcast::Sender<WatchError>,
	current_tx: watch::Sender<Option<Lockfile>>,
}

impl EventLoop {
	/// Multi-wait over the event stream, the watcher error stream and the
	/// stop signal.
	///
	/// The select is biased: pending events and watcher errors are drained
	/// before a pending stop signal is honored. Both streams closing on
	/// their own means the watcher backend died; the loop then exits and
	/// the session is degraded until reconstructed.
	async fn run(
		mut self,
		events: chan::Receiver<FsEvent>,
		watcher_errors: chan::Receiver<WatcherError>,
		stop: chan::Receiver<()>,
	) {
		loop {
			tokio::select! {
				biased;

				event = events.recv() => match event {
					Ok(event) => self.handle_event(event).await,
					Err(_) => {
						warn!("filesystem event stream closed, leaving event loop");
						break;
					}
				},

				watch_error = watcher_errors.recv() => match watch_error {
					Ok(e) => {
						let _ = self.error_tx.send(WatchError::Watcher(e));
					}
					Err(_) => {
						warn!("watcher error stream closed, leaving event loop");
						break;
					}
				},

				_ = stop.recv() => {
					debug!("stop signal received, leaving event loop");
					break;
				}
			}
		}
	}

	async fn handle_event(&mut self, event: FsEvent) {
		let Some(change) = self.classifier.classify(&event) else {
			trace!(path = %event.path.display(), kind = ?event.kind, "ignoring unrelated event");
			return;
		};

		match change {
			LockfileChange::Removed => {
				debug!("lockfile removed");
				self.publish(None);
			}
			LockfileChange::Rewritten => match Lockfile::load(&self.lockfile_path).await {
				Ok(lockfile) => {
					debug!(
						name = %lockfile.name,
						pid = lockfile.pid,
						port = lockfile.port,
						"lockfile written",
					);
					self.publish(Some(lockfile));
				}
				Err(e) => {
					// Often a transient read mid-write; the producer's next
					// write event recovers the state, so only the error is
					// published and no availability notification goes out
					self.current_tx.send_replace(None);
					let _ = self.error_tx.send(WatchError::Lockfile(e));
				}
			},
		}
	}

	/// Replace the snapshot and notify subscribers.
	fn publish(&mut self, lockfile: Option<Lockfile>) {
		let state = match lockfile.clone() {
			Some(lockfile) => LockfileState::Available(lockfile),
			None => LockfileState::Absent,
		};

		self.current_tx.send_replace(lockfile);
		let _ = self.state_tx.send(state);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rl_fs_watcher::FsEventKind;
	use tempfile::tempdir;

	#[tokio::test]
	async fn test_stop_before_start_fails_fast() {
		let dir = tempdir().unwrap();
		let mut session = WatchSession::with_paths(LockfilePaths::in_dir(dir.path()));

		assert!(matches!(
			session.stop().await,
			Err(SessionError::NotRunning)
		));
		assert_eq!(session.phase(), Phase::Idle);
	}

	#[tokio::test]
	async fn test_double_start_fails_fast() {
		let dir = tempdir().unwrap();
		let mut session = WatchSession::with_paths(LockfilePaths::in_dir(dir.path()));

		session.start().unwrap();
		assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));

		session.stop().await.unwrap();
	}

	#[tokio::test]
	async fn test_double_stop_fails_fast() {
		let dir = tempdir().unwrap();
		let mut session = WatchSession::with_paths(LockfilePaths::in_dir(dir.path()));

		session.start().unwrap();
		session.stop().await.unwrap();

		assert!(matches!(
			session.stop().await,
			Err(SessionError::NotRunning)
		));
	}

	#[tokio::test]
	async fn test_stopped_session_is_not_restartable() {
		let dir = tempdir().unwrap();
		let mut session = WatchSession::with_paths(LockfilePaths::in_dir(dir.path()));

		session.start().unwrap();
		session.stop().await.unwrap();

		assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));
		assert_eq!(session.phase(), Phase::Stopped);
	}

	#[tokio::test]
	async fn test_stop_releases_resources_exactly_once() {
		let dir = tempdir().unwrap();
		let mut session = WatchSession::with_paths(LockfilePaths::in_dir(dir.path()));
		assert_eq!(session.phase(), Phase::Idle);

		session.start().unwrap();
		assert_eq!(session.phase(), Phase::Running);
		assert!(session.watcher.is_some());

		session.stop().await.unwrap();
		assert_eq!(session.phase(), Phase::Stopped);
		assert!(session.watcher.is_none());
		assert!(session.consumer.is_none());
		assert!(session.logger.is_none());
		assert!(session.error_tx.is_none());
	}

	#[tokio::test]
	async fn test_failed_directory_open_is_fatal_and_reported() {
		let dir = tempdir().unwrap();
		let mut session =
			WatchSession::with_paths(LockfilePaths::in_dir(dir.path().join("missing")));
		let mut errors = session.subscribe_errors();

		let result = session.start();

		assert!(matches!(result, Err(SessionError::Watch(_))));
		assert_eq!(session.phase(), Phase::Idle);
		assert!(matches!(
			errors.try_recv().unwrap(),
			WatchError::Watcher(_)
		));
	}

	#[tokio::test]
	async fn test_queued_events_drain_before_stop() {
		let dir = tempdir().unwrap();
		let lockfile_path = dir.path().join("lockfile");
		tokio::fs::write(&lockfile_path, "RC:1:2:pw:https")
			.await
			.unwrap();

		let (events_tx, events_rx) = chan::unbounded();
		let (errors_tx, errors_rx) = chan::unbounded::<WatcherError>();
		let (stop_tx, stop_rx) = chan::bounded(1);
		let (state_tx, mut state_rx) = broadcast::channel(NOTIFY_BUFFER);
		let (error_tx, _error_rx) = broadcast::channel(NOTIFY_BUFFER);
		let (current_tx, _current_rx) = watch::channel(None);

		// Queue a burst of events and the stop signal before the loop
		// even begins polling
		for _ in 0..3 {
			events_tx
				.send(FsEvent {
					kind: FsEventKind::Written,
					path: lockfile_path.clone(),
				})
				.await
				.unwrap();
		}
		stop_tx.send(()).await.unwrap();

		let event_loop = EventLoop {
			classifier: EventClassifier::new(&lockfile_path),
			lockfile_path: lockfile_path.clone(),
			state_tx,
			error_tx,
			current_tx,
		};
		event_loop.run(events_rx, errors_rx, stop_rx).await;

		// All three queued writes were classified before the stop was
		// honored
		for _ in 0..3 {
			assert!(matches!(
				state_rx.try_recv().unwrap(),
				LockfileState::Available(_)
			));
		}
		assert!(state_rx.try_recv().is_err());

		drop(events_tx);
		drop(errors_tx);
	}
}
