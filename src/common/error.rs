//! Error types for the application.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::common::events::Platform;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors raised by a platform adaptor while it is being built or started.
///
/// These are fatal for the affected platform only.
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{platform} has no binding in this build")]
    Unsupported { platform: Platform },

    #[error("Failed to start {platform}: {message}")]
    Start { platform: Platform, message: String },

    #[error("Discord error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on the proxy plugin link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] LinesCodecError),

    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for adaptor operations.
pub type AdaptorResult<T> = std::result::Result<T, AdaptorError>;
