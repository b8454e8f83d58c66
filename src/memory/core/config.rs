//! Configuration for the memory subsystem.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::strategy::{ACTOR_PLACEHOLDER, StrategyConfig, default_strategies};

/// Top-level configuration for the memory layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Shared store provisioning settings.
    pub store: StoreConfig,
    /// Profile aggregation settings.
    pub profile: ProfileConfig,
    /// Local storage settings.
    pub storage: StorageConfig,
}

impl MemoryConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.store.name.trim().is_empty() {
            return Err(MemoryError::InvalidConfig(
                "store.name must not be empty".to_string(),
            ));
        }

        if self.store.event_expiry_days == 0 {
            return Err(MemoryError::InvalidConfig(
                "store.event_expiry_days must be > 0".to_string(),
            ));
        }

        if self.store.creation_timeout_millis == 0 {
            return Err(MemoryError::InvalidConfig(
                "store.creation_timeout_millis must be > 0".to_string(),
            ));
        }

        if self.store.poll_interval_millis == 0 {
            return Err(MemoryError::InvalidConfig(
                "store.poll_interval_millis must be > 0".to_string(),
            ));
        }

        if self.store.strategies.is_empty() {
            return Err(MemoryError::InvalidConfig(
                "store.strategies must not be empty".to_string(),
            ));
        }

        for strategy in &self.store.strategies {
            match strategy.primary_namespace() {
                Some(template) if template.contains(ACTOR_PLACEHOLDER) => {}
                _ => {
                    return Err(MemoryError::InvalidConfig(format!(
                        "strategy {} needs a namespace containing {ACTOR_PLACEHOLDER}",
                        strategy.kind
                    )));
                }
            }
        }

        if self.profile.top_k == 0 {
            return Err(MemoryError::InvalidConfig(
                "profile.top_k must be > 0".to_string(),
            ));
        }

        if self.profile.history_event_limit == 0 {
            return Err(MemoryError::InvalidConfig(
                "profile.history_event_limit must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings for the shared, named memory store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Fixed store name; identifiers are `name-<suffix>`.
    pub name: String,
    /// Description sent on creation.
    pub description: String,
    /// Event retention horizon in days.
    pub event_expiry_days: u32,
    /// Upper bound on waiting for a new store to become active.
    pub creation_timeout_millis: u64,
    /// Delay between readiness polls.
    pub poll_interval_millis: u64,
    /// Strategies configured at creation time.
    pub strategies: Vec<StrategyConfig>,
}

impl StoreConfig {
    /// Creation wait as a [`Duration`].
    #[must_use]
    pub const fn creation_timeout(&self) -> Duration {
        Duration::from_millis(self.creation_timeout_millis)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "MarketTrendsAgentMultiStrategy".to_string(),
            description: "Market Trends Agent with multi-strategy broker memory".to_string(),
            event_expiry_days: 90,
            creation_timeout_millis: 300_000,
            poll_interval_millis: 2_000,
            strategies: default_strategies(),
        }
    }
}

/// Settings for profile aggregation and history views.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Fragments retrieved per strategy.
    pub top_k: usize,
    /// Fragments at or below this many chars (trimmed) are noise.
    pub min_fragment_chars: usize,
    /// Ranking query for profile retrieval.
    pub profile_query: String,
    /// Ranking query for the identification probe.
    pub probe_query: String,
    /// Fragments requested by the identification probe.
    pub probe_top_k: usize,
    /// Events scanned by the history fallback.
    pub history_event_limit: usize,
    /// History messages at or below this many chars are skipped.
    pub min_history_message_chars: usize,
    /// Max chars kept from one history message.
    pub history_excerpt_chars: usize,
    /// Number of trailing history messages returned.
    pub history_keep_last: usize,
    /// Keywords that mark a message as profile-related.
    pub keywords: Vec<String>,
    /// Events shown by the conversation history view.
    pub view_events: usize,
    /// Max chars per message in the conversation history view.
    pub view_excerpt_chars: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_fragment_chars: 20,
            profile_query: "broker financial profile investment preferences risk tolerance"
                .to_string(),
            probe_query: "broker profile investment preferences".to_string(),
            probe_top_k: 1,
            history_event_limit: 10,
            min_history_message_chars: 50,
            history_excerpt_chars: 200,
            history_keep_last: 2,
            keywords: [
                "broker",
                "investment",
                "risk tolerance",
                "portfolio",
                "preference",
                "client",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            view_events: 5,
            view_excerpt_chars: 100,
        }
    }
}

/// Storage configuration for the local backing service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("market_memory.sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::strategy::StrategyKind;

    #[test]
    fn defaults_validate() {
        let config = MemoryConfig::default();
        config.validate().unwrap();
        assert_eq!(config.store.event_expiry_days, 90);
        assert_eq!(config.profile.top_k, 3);
        assert_eq!(config.profile.min_fragment_chars, 20);
    }

    #[test]
    fn rejects_template_without_actor() {
        let mut config = MemoryConfig::default();
        config.store.strategies = vec![StrategyConfig::new(
            StrategyKind::Semantic,
            "Flat",
            "no actor",
            "market-trends/shared",
        )];
        assert!(matches!(
            config.validate(),
            Err(MemoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_empty_name() {
        let mut config = MemoryConfig::default();
        config.store.name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
