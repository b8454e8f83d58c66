//! Market data tools: stock quote pages and news searches.
//!
//! Both tools fetch a public page and return its visible text, capped to a
//! configured length, for the model to read. Failures are folded into a
//! plain-text error line so a tool call never aborts a turn.

pub mod cache;
pub mod config;
pub mod error;
pub mod news;
pub mod page;

pub use cache::PageCache;
pub use config::{MarketConfig, PageCacheConfig};
pub use error::{MarketError, MarketResult};
pub use news::NewsSource;

use tracing::{debug, warn};
use url::Url;

/// HTTP client for market pages.
pub struct MarketClient {
    config: MarketConfig,
    client: reqwest::Client,
    cache: PageCache,
}

impl MarketClient {
    /// Create a client with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: MarketConfig) -> MarketResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;
        let cache = PageCache::new(config.cache.clone());
        Ok(Self {
            config,
            client,
            cache,
        })
    }

    fn build_client(config: &MarketConfig) -> MarketResult<reqwest::Client> {
        use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};

        let mut headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| MarketError::HttpClient(e.to_string()))
    }

    /// Quote page text for a ticker, or an error line.
    pub async fn get_stock_data(&self, symbol: &str) -> String {
        match self.try_stock_data(symbol).await {
            Ok(text) => text,
            Err(err) => {
                warn!(symbol, %err, "Stock lookup failed");
                format!("Error getting stock data for {symbol}: {err}")
            }
        }
    }

    /// Quote page text for a ticker.
    ///
    /// # Errors
    /// Returns an error if the symbol is invalid or the page cannot be read.
    pub async fn try_stock_data(&self, symbol: &str) -> MarketResult<String> {
        let symbol = normalize_symbol(symbol)?;
        let url = quote_url(&symbol);
        let text = self.fetch_text(&url, self.config.stock_text_chars).await?;
        Ok(format!("Quote page for {symbol} ({url}):\n{text}"))
    }

    /// News search page text, or an error line.
    pub async fn search_news(&self, query: &str, source: &str) -> String {
        match self.try_search_news(query, NewsSource::from_name(source)).await {
            Ok(text) => text,
            Err(err) => {
                warn!(query, source, %err, "News search failed");
                format!("Error searching {source} for '{query}': {err}")
            }
        }
    }

    /// News search page text for one source.
    ///
    /// # Errors
    /// Returns an error if the query is blank or the page cannot be read.
    pub async fn try_search_news(&self, query: &str, source: NewsSource) -> MarketResult<String> {
        if query.trim().is_empty() {
            return Err(MarketError::EmptyQuery);
        }
        let url = source.search_url(query);
        let text = self.fetch_text(&url, self.config.news_text_chars).await?;
        Ok(format!("{source} results for '{}':\n{text}", query.trim()))
    }

    async fn fetch_text(&self, url: &str, max_chars: usize) -> MarketResult<String> {
        Url::parse(url)?;

        if let Some(cached) = self.cache.get(url) {
            debug!(url, "Page cache hit");
            return Ok(page::truncate_chars(&cached, max_chars).to_string());
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Err(MarketError::UnsupportedContentType(content_type));
        }

        let body = response.text().await?;
        let text = if content_type.contains("text/html") {
            page::visible_text(&body)
        } else {
            page::clean_text(&body)
        };
        if text.is_empty() {
            return Err(MarketError::EmptyPage(url.to_string()));
        }

        self.cache.insert(url, &text);
        Ok(page::truncate_chars(&text, max_chars).to_string())
    }
}

/// Upper-case and validate a ticker symbol.
///
/// # Errors
/// Returns [`MarketError::InvalidSymbol`] for blank input or characters
/// outside letters, digits, `.`, `-`, `^` and `=`.
pub fn normalize_symbol(symbol: &str) -> MarketResult<String> {
    let trimmed = symbol.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= 16
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if valid {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(MarketError::InvalidSymbol(symbol.to_string()))
    }
}

/// Yahoo Finance quote page for a normalized symbol.
#[must_use]
pub fn quote_url(symbol: &str) -> String {
    format!("https://finance.yahoo.com/quote/{}", urlencoding::encode(symbol))
}
