//! Error types for the worker.

use thiserror::Error;

/// Result type alias for worker operations.
pub type SwResult<T> = Result<T, SwError>;

/// Errors that can occur while handling worker events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Clients error: {0}")]
    Clients(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("No bearer credential available")]
    MissingCredential,

    #[error("Invalid URL '{input}': {message}")]
    InvalidUrl { input: String, message: String },

    #[error("State error: {0}")]
    State(String),
}

impl SwError {
    /// Create a network error for a URL.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an invalid URL error.
    pub fn invalid_url(input: impl Into<String>, err: url::ParseError) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            message: err.to_string(),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SwError::Config(_) => "config",
            SwError::Cache(_) => "cache",
            SwError::Network { .. } => "network",
            SwError::HttpStatus { .. } => "http_status",
            SwError::Notification(_) => "notification",
            SwError::Clients(_) => "clients",
            SwError::Subscription(_) => "subscription",
            SwError::MissingCredential => "credential",
            SwError::InvalidUrl { .. } => "invalid_url",
            SwError::State(_) => "state",
        }
    }
}
