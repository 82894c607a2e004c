//! Error types for Detox Guard

use thiserror::Error;

/// Result type alias for Guard operations
pub type Result<T> = std::result::Result<T, DetoxError>;

/// Guard error types
#[derive(Debug, Error)]
pub enum DetoxError {
    /// Backend answered 429
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Backend answered with a non-success status
    #[error("API error: {status}")]
    Http { status: u16 },

    /// Backend could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// Request outlived its deadline
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Server mode name not recognised or not selectable
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// Custom server URL could not be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Settings store error
    #[error("Settings store error: {0}")]
    StoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for DetoxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DetoxError::Timeout(0)
        } else if let Some(status) = err.status() {
            DetoxError::Http {
                status: status.as_u16(),
            }
        } else {
            DetoxError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for DetoxError {
    fn from(err: url::ParseError) -> Self {
        DetoxError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for DetoxError {
    fn from(err: toml::de::Error) -> Self {
        DetoxError::ConfigError(err.to_string())
    }
}

impl From<toml::ser::Error> for DetoxError {
    fn from(err: toml::ser::Error) -> Self {
        DetoxError::ConfigError(err.to_string())
    }
}
