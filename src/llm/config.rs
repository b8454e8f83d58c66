//! Chat model configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::llm::error::{LlmError, LlmResult};

/// Settings for the Ollama chat model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama model name; must support tool calling.
    pub model: String,
    /// Ollama base URL.
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional max tokens per reply.
    pub max_tokens: Option<u64>,
    /// How long Ollama keeps the model loaded.
    pub keep_alive: String,
    /// Whole-request timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Upper bound on model/tool round trips in one turn.
    pub max_tool_rounds: usize,
}

impl LlmConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Parsed base URL.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse.
    pub fn base_url(&self) -> LlmResult<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> LlmResult<()> {
        if self.model.trim().is_empty() {
            return Err(LlmError::Config("model must not be empty".to_string()));
        }

        let url = self.base_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LlmError::Config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(LlmError::Config(
                "temperature must be in 0.0..=2.0".to_string(),
            ));
        }

        if self.max_tool_rounds == 0 {
            return Err(LlmError::Config(
                "max_tool_rounds must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1:8b".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            temperature: 0.1,
            max_tokens: None,
            keep_alive: "30m".to_string(),
            request_timeout_seconds: 120,
            max_tool_rounds: 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = LlmConfig::default();
        config.validate().unwrap();
        assert!((config.temperature - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_url() {
        let config = LlmConfig {
            base_url: "not a url".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(config.validate(), Err(LlmError::InvalidUrl(_))));

        let config = LlmConfig {
            base_url: "ftp://127.0.0.1".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(config.validate(), Err(LlmError::Config(_))));
    }
}
