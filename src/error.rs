use thiserror::Error;

/// Errors raised while setting up a buffer or loading its configuration.
///
/// Dispatching managed calls never fails: over-limit calls are queued or
/// dropped, never reported.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_config(key: &str, value: &str) -> Self {
        Error::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
