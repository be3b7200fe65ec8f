//! Lockfile codec
//!
//! While it runs, the Riot Client keeps a single-line lockfile of five
//! `:`-separated fields in its config directory:
//!
//! ```text
//! name:pid:port:password:protocol
//! ```
//!
//! Fields cannot contain `:`; there is no escaping. A field containing the
//! separator breaks parsing, which is a limitation of the format itself.

use serde::{Deserialize, Serialize};
use std::{
	io,
	num::ParseIntError,
	path::{Path, PathBuf},
	sync::Arc,
};
use thiserror::Error;

/// Number of `:`-separated fields in a well-formed lockfile.
const FIELD_COUNT: usize = 5;

/// Failure to read or parse a lockfile.
///
/// Cloneable so it can travel on broadcast channels; the non-cloneable
/// I/O source is shared behind `Arc`.
#[derive(Debug, Clone, Error)]
pub enum LockfileError {
	#[error("no lockfile found at {}", .0.display())]
	NotFound(PathBuf),

	#[error("failed to read the lockfile bytes: {0}")]
	Read(Arc<io::Error>),

	#[error("expected {FIELD_COUNT} `:`-separated fields, found {0}")]
	BadLength(usize),

	#[error("failed to parse process id: {0}")]
	InvalidProcessId(ParseIntError),

	#[error("failed to parse port: {0}")]
	InvalidPort(ParseIntError),
}

/// Parsed contents of the lockfile at one point in time.
///
/// `pid` is expected to be positive and `port` to fall in 1–65535, but
/// neither is range-validated: any base-10 integer the producer writes is
/// accepted verbatim, like the rest of the fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
	pub name: String,
	pub pid: i32,
	pub port: i32,
	pub password: String,
	pub protocol: String,
}

impl Lockfile {
	/// Parse raw lockfile content.
	///
	/// Deterministic and side-effect free: identical input yields an
	/// identical record or an identical failure kind, and a record is
	/// never partially populated.
	pub fn parse(content: &str) -> Result<Self, LockfileError> {
		let fields: Vec<&str> = content.split(':').collect();
		if fields.len() != FIELD_COUNT {
			return Err(LockfileError::BadLength(fields.len()));
		}

		let pid = fields[1].parse().map_err(LockfileError::InvalidProcessId)?;
		let port = fields[2].parse().map_err(LockfileError::InvalidPort)?;

		Ok(Self {
			name: fields[0].to_string(),
			pid,
			port,
			password: fields[3].to_string(),
			protocol: fields[4].to_string(),
		})
	}

	/// Read and parse the lockfile at `path`.
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, LockfileError> {
		let path = path.as_ref();

		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			if e.kind() == io::ErrorKind::NotFound {
				LockfileError::NotFound(path.to_path_buf())
			} else {
				LockfileError::Read(Arc::new(e))
			}
		})?;

		Self::parse(&content)
	}

	/// Whether a lockfile currently exists at `path`.
	pub fn exists(path: impl AsRef<Path>) -> bool {
		path.as_ref().is_file()
	}
}
