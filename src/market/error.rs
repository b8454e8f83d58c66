//! Error types for the market tools.

use thiserror::Error;

/// Errors that can occur while fetching market pages.
#[derive(Debug, Error)]
pub enum MarketError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// HTTP client configuration error.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Ticker symbol rejected before any request was made.
    #[error("Invalid ticker symbol: {0:?}")]
    InvalidSymbol(String),

    /// Search query is blank.
    #[error("Search query is empty")]
    EmptyQuery,

    /// Content type not supported.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Page had no visible text.
    #[error("No readable text on {0}")]
    EmptyPage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience result alias for market operations.
pub type MarketResult<T> = Result<T, MarketError>;
