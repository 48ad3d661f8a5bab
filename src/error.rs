//! Error types for the continual streams library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
///
/// Configuration problems are reported eagerly by constructors. Once a stream
/// is built, `step()` does not fail.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown name or missing/invalid parameter
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    /// Dataset provider failure
    #[error("Dataset error: {0}")]
    DatasetError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::ConfigurationError(message.into())
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::ConfigurationError(_))
    }

    /// Message without the error kind prefix
    pub fn detail(&self) -> String {
        match self {
            Error::ConfigurationError(message) | Error::DatasetError(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
