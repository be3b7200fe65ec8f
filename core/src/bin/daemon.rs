use clap::Parser;
use rl_core::{
	config::{default_data_dir, LockfilePaths},
	LockfileState, WatchSession,
};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lockwatch-daemon", about = "Riot Client lockfile watcher daemon")]
struct Args {
	/// Watch this directory instead of the platform Riot Client config path
	#[arg(long)]
	config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	let data_dir = default_data_dir()?;
	let _guard = rl_core::init_logging(data_dir.join("logs"));

	let paths = match args.config_dir {
		Some(dir) => LockfilePaths::in_dir(dir),
		None => LockfilePaths::resolve()?,
	};

	let mut session = WatchSession::with_paths(paths);

	// Stand-in consumer: log every availability transition. The password
	// field stays out of the logs.
	let mut states = session.subscribe();
	tokio::spawn(async move {
		loop {
			match states.recv().await {
				Ok(LockfileState::Available(lockfile)) => {
					info!(
						name = %lockfile.name,
						pid = lockfile.pid,
						port = lockfile.port,
						protocol = %lockfile.protocol,
						"lockfile available",
					);
				}
				Ok(LockfileState::Absent) => info!("lockfile absent"),
				Err(RecvError::Closed) => break,
				Err(RecvError::Lagged(n)) => {
					warn!("availability consumer lagged by {n} notifications");
				}
			}
		}
	});

	session.start()?;

	// Graceful shutdown on Ctrl+C or SIGTERM
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => info!("received Ctrl+C, shutting down gracefully..."),
		() = terminate => info!("received SIGTERM, shutting down gracefully..."),
	}

	session.stop().await?;

	Ok(())
}
