//! Error types for fortidash-throttle.

use std::time::Duration;
use thiserror::Error;

/// Main error type for limiter and configuration operations.
///
/// A rejected admission check is not an error; `check_limit` reports it as
/// `false`. These variants cover configuration problems and the opt-in
/// bounded wait.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded wait gave up before a slot became available
    #[error("Timed out after {waited:?} waiting for a rate limit slot for key '{key}'")]
    WaitTimeout { key: String, waited: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for LimiterError {
    fn from(err: ::config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Errors returned by the throttled inventory client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server rejected the request with HTTP 429
    #[error("RATE_LIMIT_EXCEEDED: server rejected request to {url}")]
    RateLimitExceeded { url: String },

    /// Any other non-success HTTP status
    #[error("Request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Transport or decoding errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL or path could not be turned into a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether this error came from a server-side 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimitExceeded { .. })
    }
}
