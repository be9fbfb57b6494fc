//! Device and endpoint configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:3333";
pub const DEFAULT_SYNC_SUFFIX: &str = "sync";
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(15);

/// Settings for a [`Device`](crate::Device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Prefix for every backend key, `"<namespace>.<key>"`.
    pub namespace: Option<String>,
    /// Pause between two batch steps.
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Run batches in an overlay snapshot instead of against durable storage.
    pub isolate: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            interval: DEFAULT_INTERVAL,
            isolate: true,
        }
    }
}

impl DeviceConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_isolation(mut self, isolate: bool) -> Self {
        self.isolate = isolate;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Where and as whom to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the remote peer, without trailing slash.
    pub url: String,
    /// Path appended to `url` for sync requests.
    pub sync_suffix: String,
    pub client_key: String,
    pub client_secret: String,
}

impl EndpointConfig {
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            sync_suffix: DEFAULT_SYNC_SUFFIX.to_string(),
            client_key: client_key.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_sync_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sync_suffix = suffix.into().trim_matches('/').to_string();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_key = env::var("DOVETAIL_CLIENT_KEY").map_err(|_| ConfigError::MissingClientKey)?;
        let client_secret =
            env::var("DOVETAIL_CLIENT_SECRET").map_err(|_| ConfigError::MissingClientSecret)?;

        let mut config = Self::new(client_key, client_secret);
        if let Ok(url) = env::var("DOVETAIL_URL") {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidUrl(url));
            }
            config = config.with_url(url);
        }
        if let Ok(suffix) = env::var("DOVETAIL_SYNC_SUFFIX") {
            config = config.with_sync_suffix(suffix);
        }
        Ok(config)
    }

    /// `<url>/<sync_suffix>`
    pub fn sync_url(&self) -> String {
        format!("{}/{}", self.url, self.sync_suffix)
    }

    /// `<url>/sp`
    pub fn sync_point_url(&self) -> String {
        format!("{}/sp", self.url)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DOVETAIL_CLIENT_KEY environment variable is required")]
    MissingClientKey,

    #[error("DOVETAIL_CLIENT_SECRET environment variable is required")]
    MissingClientSecret,

    #[error("Invalid DOVETAIL_URL value: '{0}'")]
    InvalidUrl(String),
}
