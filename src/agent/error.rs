//! Error types for the agent.

use thiserror::Error;

use crate::llm::LlmError;
use crate::market::MarketError;
use crate::memory::core::errors::MemoryError;

/// Agent error type.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Memory setup or provisioning failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    /// Chat model failed.
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
    /// Market client setup failed.
    #[error("market error: {0}")]
    Market(#[from] MarketError),
    /// Actor resolver patterns failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
    /// The model kept calling tools past the round limit.
    #[error("model still calling tools after {0} rounds")]
    ToolRoundsExceeded(usize),
}

/// Convenience result alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
