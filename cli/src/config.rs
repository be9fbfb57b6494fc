//! Configuration management for the CLI.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Store configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the store
    pub path: PathBuf,
    /// Key namespace inside the store
    pub namespace: Option<String>,
    /// Pause between batch steps
    pub interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./scratch"),
            namespace: None,
            interval: Duration::from_millis(15),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let path = env::var("DOVETAIL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.path);

        let namespace = env::var("DOVETAIL_NAMESPACE")
            .ok()
            .filter(|ns| !ns.is_empty());

        let interval = match env::var("DOVETAIL_INTERVAL_MS") {
            Ok(value) => value
                .parse()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidInterval(value))?,
            Err(_) => defaults.interval,
        };

        Ok(Self {
            path,
            namespace,
            interval,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid DOVETAIL_INTERVAL_MS value: '{0}'")]
    InvalidInterval(String),
}
