//! Chat model boundary.
//!
//! The agent only needs one capability from a model: given a transcript and
//! a tool catalogue, return either a final answer or tool calls.
//! [`OllamaChatModel`] is the production implementation.

pub mod config;
pub mod error;
pub mod ollama;

pub use config::LlmConfig;
pub use error::{LlmError, LlmResult};
pub use ollama::OllamaChatModel;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future type for chat model operations.
pub type ChatFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Speaker of a transcript message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// End user.
    User,
    /// Model output.
    Assistant,
    /// Tool result.
    Tool,
}

/// A structured tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// JSON object of arguments.
    pub arguments: serde_json::Value,
}

/// One transcript message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
    /// Tool calls attached to an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool that produced a [`ChatRole::Tool`] message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }

    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    /// Assistant message, with any tool calls it made.
    #[must_use]
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(ChatRole::Assistant, content)
        }
    }

    /// Tool result message.
    #[must_use]
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.into()),
            ..Self::plain(ChatRole::Tool, content)
        }
    }
}

/// Tool description advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// What the tool does and when to use it.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// Model output for one request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    /// Text content; may be empty when tools are called.
    pub content: String,
    /// Requested tool calls, in order.
    pub tool_calls: Vec<ToolCall>,
}

/// Chat model contract.
pub trait ChatModel: Send + Sync {
    /// Produce a reply for the transcript.
    ///
    /// # Errors
    /// Returns an error if the model cannot be reached or replies with an
    /// unreadable payload.
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolSpec],
    ) -> ChatFuture<'a, LlmResult<ModelReply>>;
}
