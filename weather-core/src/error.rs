use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the caching and resolution layer.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// The HTTP request could not be completed (DNS, connect, timeout, ...).
    #[error("Failed to reach OpenWeather: {0}")]
    Transport(String),

    /// OpenWeather answered with a failing `cod`, or with an error status and no `cod`.
    #[error("OpenWeather request failed with status {code}: {message}")]
    Upstream { code: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to access {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A field a command relies on is missing or has an unexpected type.
    #[error("Unexpected OpenWeather payload: {0}")]
    Payload(String),

    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeatherError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeatherError::Storage { path: path.into(), source }
    }
}

pub type Result<T, E = WeatherError> = std::result::Result<T, E>;
