// src/error.rs

//! Unified error handling for the harvester application.

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkpoint storage failure. Fatal to the current run: continuing to
    /// accumulate after a failed persist is equivalent to losing the work.
    #[error("Storage error for {path}: {message}")]
    Storage { path: String, message: String },

    /// Per-target fetch failure that escaped the harvest loop
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error with the offending path.
    pub fn storage(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Failure modes for fetching a single target.
///
/// These are recorded and skipped by the harvest loop; one bad listing never
/// aborts a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Request exceeded the per-request timeout
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status (4xx other than 429 is permanent)
    #[error("HTTP status {0}")]
    Status(u16),

    /// Still rate limited after the retry ceiling
    #[error("rate limited after retries")]
    RateLimited,

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Response carried no extractable content, even after the render
    /// fallback
    #[error("no usable content in response")]
    Unusable,
}

impl FetchError {
    /// Classify a reqwest error into the fetch taxonomy.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = error.status() {
            if status.as_u16() == 429 {
                return Self::RateLimited;
            }
            return Self::Status(status.as_u16());
        }
        Self::Network(error.to_string())
    }

    /// Whether a retry with backoff is worthwhile.
    ///
    /// Rate limiting is handled separately with its own retry cap.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Status(code) => *code >= 500,
            Self::RateLimited | Self::Unusable => false,
        }
    }
}
