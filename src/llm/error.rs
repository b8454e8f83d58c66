//! Error types for the chat model boundary.

use thiserror::Error;

/// Chat model error type.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Non-success status from the model server.
    #[error("model server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// Malformed JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience result alias for chat model operations.
pub type LlmResult<T> = Result<T, LlmError>;
