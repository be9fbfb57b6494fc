//! Unified error handling for the CLI.

use dovetail_engine::Failure;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Engine error: {0}")]
    Engine(#[from] dovetail_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Endpoint configuration error: {0}")]
    Endpoint(#[from] dovetail_engine::ConfigError),

    #[error("Invalid JSON argument: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {}", describe(.0))]
    Failed(Box<Failure>),
}

fn describe(failure: &Failure) -> String {
    let kind = serde_json::to_value(failure.error)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", failure.error));
    match (&failure.resource, &failure.description) {
        (_, Some(description)) => format!("{kind} ({description})"),
        (Some(resource), None) => format!("{kind} ({resource})"),
        (None, None) => kind,
    }
}

/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, CliError>;
