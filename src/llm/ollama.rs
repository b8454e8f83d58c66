//! Ollama `/api/chat` client with tool calling.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::llm::config::LlmConfig;
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::{ChatFuture, ChatMessage, ChatModel, ChatRole, ModelReply, ToolCall, ToolSpec};

/// Max chars of an error body kept in [`LlmError::Status`].
const ERROR_BODY_CHARS: usize = 500;

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u64>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct OutgoingFunction<'a> {
    name: &'a str,
    arguments: &'a serde_json::Value,
}

#[derive(Serialize)]
struct OutgoingCall<'a> {
    function: OutgoingFunction<'a>,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    role: ChatRole,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OutgoingCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for OutgoingMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role,
            content: &message.content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OutgoingCall {
                    function: OutgoingFunction {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_name: message.tool_name.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OutgoingMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
    keep_alive: &'a str,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct WireCallFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct WireCall {
    function: WireCallFunction,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireCall>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

/// Ollama-backed [`ChatModel`].
#[derive(Clone)]
pub struct OllamaChatModel {
    client: Client,
    endpoint: Url,
    config: LlmConfig,
}

impl OllamaChatModel {
    /// Create a client from config.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        config.validate()?;
        let endpoint = config.base_url()?.join("api/chat")?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            config: config.clone(),
        })
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], tools: &'a [ToolSpec]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages.iter().map(OutgoingMessage::from).collect(),
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.parameters,
                    },
                })
                .collect(),
            stream: false,
            keep_alive: &self.config.keep_alive,
            options: ChatOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }
}

impl ChatModel for OllamaChatModel {
    fn chat<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        tools: &'a [ToolSpec],
    ) -> ChatFuture<'a, LlmResult<ModelReply>> {
        Box::pin(async move {
            let request = self.request(messages, tools);
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(LlmError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(ERROR_BODY_CHARS).collect(),
                });
            }

            let reply = parse_reply(&body)?;
            debug!(
                model = %self.config.model,
                tool_calls = reply.tool_calls.len(),
                "Model replied"
            );
            Ok(reply)
        })
    }
}

fn parse_reply(body: &str) -> LlmResult<ModelReply> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let tool_calls = response
        .message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            name: call.function.name,
            arguments: normalize_arguments(call.function.arguments),
        })
        .collect();
    Ok(ModelReply {
        content: response.message.content,
        tool_calls,
    })
}

/// Some models send arguments as a JSON string instead of an object.
fn normalize_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => serde_json::from_str(&raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw)),
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other,
    }
}
