//! Path resolution for the watched Riot Client installation

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve or prepare a platform user directory.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the user cache directory")]
    CacheDirUnavailable,

    #[error("could not determine the application data directory")]
    DataDirUnavailable,

    #[error("could not create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// The directory watched for lockfile changes plus the target file itself.
///
/// Both paths are absolute; `lockfile` is always directly inside
/// `config_dir` so a non-recursive watch on the directory sees every
/// change to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockfilePaths {
    pub config_dir: PathBuf,
    pub lockfile: PathBuf,
}

impl LockfilePaths {
    /// Resolve the Riot Client config directory under the platform user
    /// cache directory.
    ///
    /// The directory does not have to exist yet; existence only matters
    /// once a watch is opened on it.
    pub fn resolve() -> Result<Self, ConfigError> {
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::CacheDirUnavailable)?;

        Ok(Self::in_dir(
            cache_dir
                .join("Riot Games")
                .join("Riot Client")
                .join("Config"),
        ))
    }

    /// Watch `config_dir` instead of the platform default.
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let lockfile = config_dir.join("lockfile");

        Self {
            config_dir,
            lockfile,
        }
    }
}

/// Platform-specific application data directory, created on demand.
///
/// Daemon logs land under it.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    #[cfg(target_os = "linux")]
    let dir = dirs::data_local_dir()
        .ok_or(ConfigError::DataDirUnavailable)?
        .join("lockwatch");

    #[cfg(not(target_os = "linux"))]
    let dir = dirs::data_dir()
        .ok_or(ConfigError::DataDirUnavailable)?
        .join("lockwatch");

    fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    Ok(dir)
}
