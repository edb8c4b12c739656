//! Configuration file support.
//!
//! Settings may be stored in `<config dir>/sftpdav/config.toml`:
//!
//! ```toml
//! user = "alice"
//! key = "/home/alice/.ssh/id_ed25519"
//! listen = "127.0.0.1:8888"
//! dir_mode = 0o750
//! file_mode = 0o640
//! ```
//!
//! Every key is optional, and command-line flags override file values.

use serde::Deserialize;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Values read from the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Remote user
    pub user: Option<String>,
    /// Private key path
    pub key: Option<PathBuf>,
    /// Password (prefer key authentication)
    pub password: Option<String>,
    /// Local address to serve WebDAV on
    pub listen: Option<SocketAddr>,
    /// Permission bits for created directories
    pub dir_mode: Option<u32>,
    /// Permission bits for created files
    pub file_mode: Option<u32>,
}

/// Default location of the configuration file
pub fn default_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("sftpdav").join("config.toml"))
}

/// Load the configuration file.
///
/// An explicit path must exist. Without one, the default location is used
/// when a file exists there, and an empty configuration otherwise.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    match explicit {
        Some(path) => read(path),
        None => match default_path() {
            Some(path) if path.is_file() => read(&path),
            _ => Ok(FileConfig::default()),
        },
    }
}

fn read(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&text, path)?;
    tracing::debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Parse configuration text; `path` is only used in error messages.
pub fn parse(text: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
