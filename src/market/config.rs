//! Configuration for the market tools.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::market::error::{MarketError, MarketResult};

/// HTTP and text-shaping settings for market lookups.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Whole-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_seconds: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Max chars of page text returned for a stock quote page.
    pub stock_text_chars: usize,
    /// Max chars of page text returned for a news search page.
    pub news_text_chars: usize,
    /// Page cache settings.
    pub cache: PageCacheConfig,
}

impl MarketConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range.
    pub fn validate(&self) -> MarketResult<()> {
        if self.request_timeout_seconds == 0 {
            return Err(MarketError::Config(
                "request_timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.stock_text_chars == 0 || self.news_text_chars == 0 {
            return Err(MarketError::Config(
                "page text caps must be > 0".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(MarketError::Config("user_agent must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 20,
            connect_timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            stock_text_chars: 3000,
            news_text_chars: 4000,
            cache: PageCacheConfig::default(),
        }
    }
}

/// Short-lived cache of fetched page text.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageCacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
    /// Max entries before expired ones are evicted.
    pub max_entries: usize,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 60,
            max_entries: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = MarketConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stock_text_chars, 3000);
        assert_eq!(config.news_text_chars, 4000);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = MarketConfig {
            request_timeout_seconds: 0,
            ..MarketConfig::default()
        };
        assert!(matches!(config.validate(), Err(MarketError::Config(_))));
    }
}
