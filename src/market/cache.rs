//! TTL cache for fetched page text.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::market::config::PageCacheConfig;

#[derive(Clone)]
struct CacheEntry {
    text: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe page text cache keyed by URL.
pub struct PageCache {
    config: PageCacheConfig,
    entries: DashMap<String, CacheEntry>,
}

impl PageCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: PageCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Cached text for a URL, if still fresh.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }

        self.entries.get(url).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(url);
                None
            } else {
                Some(entry.text.clone())
            }
        })
    }

    /// Store text for a URL.
    pub fn insert(&self, url: &str, text: &str) {
        if !self.config.enabled {
            return;
        }

        if self.entries.len() >= self.config.max_entries {
            self.entries.retain(|_, entry| !entry.is_expired());
        }
        if self.entries.len() >= self.config.max_entries {
            return;
        }

        let ttl = Duration::from_secs(self.config.ttl_seconds);
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                text: text.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ttl_seconds: u64, max_entries: usize) -> PageCacheConfig {
        PageCacheConfig {
            enabled: true,
            ttl_seconds,
            max_entries,
        }
    }

    #[test]
    fn fresh_entries_are_served() {
        let cache = PageCache::new(config(60, 8));
        cache.insert("https://finance.yahoo.com/quote/AAPL", "Apple Inc. 190.12");
        assert_eq!(
            cache.get("https://finance.yahoo.com/quote/AAPL").as_deref(),
            Some("Apple Inc. 190.12")
        );
        assert!(cache.get("https://finance.yahoo.com/quote/MSFT").is_none());
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = PageCache::new(config(0, 8));
        cache.insert("u", "text");
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("u").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_skips_inserts() {
        let cache = PageCache::new(config(60, 1));
        cache.insert("a", "1");
        cache.insert("b", "2");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = PageCache::new(PageCacheConfig {
            enabled: false,
            ..PageCacheConfig::default()
        });
        cache.insert("a", "1");
        assert!(cache.get("a").is_none());
    }
}
