//! Core of the Riot Client lockfile watcher.
//!
//! The Riot Client writes a small `lockfile` describing its local API
//! endpoint into its config directory while it is running, and deletes it
//! on exit. This crate watches that directory, keeps a parsed snapshot of
//! the lockfile, and publishes availability transitions and errors to
//! consumers over broadcast channels.
//!
//! Module map:
//!
//! - [`config`] — resolution of the watched directory and the app's own
//!   data directory
//! - [`lockfile`] — the lockfile codec and record type
//! - [`session`] — the watch session lifecycle and event classification

use std::path::Path;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::LevelFilter,
	fmt::{self, Layer},
	prelude::*,
	EnvFilter,
};

pub mod config;
pub mod lockfile;
pub mod session;

pub use lockfile::{Lockfile, LockfileError};
pub use session::{LockfileState, Phase, SessionError, WatchError, WatchSession};

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

/// Install the global tracing subscriber: console output plus a
/// daily-rolling file under `log_dir`.
///
/// The returned guard flushes the file appender when dropped; hold it for
/// the lifetime of the process.
pub fn init_logging(log_dir: impl AsRef<Path>) -> WorkerGuard {
	let (non_blocking, guard) =
		tracing_appender::non_blocking(rolling::daily(log_dir.as_ref(), "lockwatch.log"));

	tracing_subscriber::registry()
		.with(
			EnvFilter::from_default_env()
				.add_directive("warn".parse().expect("Error invalid tracing directive!"))
				.add_directive(
					"rl_core=debug"
						.parse()
						.expect("Error invalid tracing directive!"),
				)
				.add_directive(
					"rl_fs_watcher=debug"
						.parse()
						.expect("Error invalid tracing directive!"),
				),
		)
		.with(fmt::layer().with_filter(CONSOLE_LOG_FILTER))
		.with(
			Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG),
		)
		.init();

	guard
}
