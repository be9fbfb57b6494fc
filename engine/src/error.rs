//! Error types for the Dovetail engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors from the Dovetail engine.
#[derive(Debug, Error)]
pub enum Error {
    // Dispatch errors
    #[error("no route matches {method}/{resource}")]
    NotFound { method: String, resource: String },

    #[error("unsupported or invalid method: {0}")]
    MethodNotSupported(String),

    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("device busy")]
    DeviceBusy,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Sync errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote peer answered with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// The wire-level kind reported in error envelopes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::MethodNotSupported(_) => ErrorKind::MethodNotSupported,
            Error::MissingKey(_) => ErrorKind::MissingKey,
            Error::DeviceBusy => ErrorKind::DeviceBusy,
            Error::InvalidPayload(_) | Error::InvalidTemplate { .. } => ErrorKind::InvalidPayload,
            Error::Storage(_) | Error::Serialization(_) => ErrorKind::StorageError,
            Error::Transport(_) | Error::Rejected { .. } | Error::Protocol(_) => {
                ErrorKind::TransportError
            }
            Error::Config(_) => ErrorKind::InvalidPayload,
        }
    }

    /// The resource the error refers to, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::NotFound { resource, .. } => Some(resource),
            Error::MissingKey(key) => Some(key),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Error kinds as they appear in the `_error` field of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    MethodNotSupported,
    MissingKey,
    DeviceBusy,
    InvalidPayload,
    StorageError,
    TransportError,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
