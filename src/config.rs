//! Top-level agent configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::error::AgentResult;
use crate::llm::LlmConfig;
use crate::market::MarketConfig;
use crate::memory::core::config::MemoryConfig;

/// Overrides the shared store name.
pub const STORE_NAME_ENV: &str = "MARKET_TRENDS_STORE_NAME";
/// Overrides the `SQLite` path of the local memory service.
pub const SQLITE_PATH_ENV: &str = "MARKET_TRENDS_SQLITE_PATH";
/// Overrides the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "MARKET_TRENDS_OLLAMA_URL";
/// Overrides the Ollama model.
pub const MODEL_ENV: &str = "MARKET_TRENDS_MODEL";

/// Everything the agent needs to start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Memory layer settings.
    pub memory: MemoryConfig,
    /// Chat model settings.
    pub llm: LlmConfig,
    /// Market tool settings.
    pub market: MarketConfig,
}

impl AgentConfig {
    /// Defaults with overrides from `MARKET_TRENDS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(name) = value(STORE_NAME_ENV) {
            config.memory.store.name = name;
        }
        if let Some(path) = value(SQLITE_PATH_ENV) {
            config.memory.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(url) = value(OLLAMA_URL_ENV) {
            config.llm.base_url = url;
        }
        if let Some(model) = value(MODEL_ENV) {
            config.llm.model = model;
        }
        config
    }

    /// Validate every section.
    ///
    /// # Errors
    /// Returns the first section error found.
    pub fn validate(&self) -> AgentResult<()> {
        self.memory.validate()?;
        self.llm.validate()?;
        self.market.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        AgentConfig::default().validate().unwrap();
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (STORE_NAME_ENV, "DeskMemory"),
            (SQLITE_PATH_ENV, "/tmp/desk.sqlite"),
            (OLLAMA_URL_ENV, "http://10.0.0.5:11434"),
            (MODEL_ENV, "  "),
        ]);
        let config = AgentConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.memory.store.name, "DeskMemory");
        assert_eq!(config.memory.storage.sqlite_path, PathBuf::from("/tmp/desk.sqlite"));
        assert_eq!(config.llm.base_url, "http://10.0.0.5:11434");
        assert_eq!(config.llm.model, LlmConfig::default().model);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_override_fails_validation() {
        let config = AgentConfig::from_lookup(|key| {
            (key == OLLAMA_URL_ENV).then(|| "localhost without scheme".to_string())
        });
        assert!(config.validate().is_err());
    }
}
