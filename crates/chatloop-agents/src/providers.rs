use async_trait::async_trait;
use chatloop_common::{ChatMessage, Error, Result};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Trait for chat-completion model integrations.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "openai").
    fn provider_id(&self) -> &str;

    /// Send a completion request and return the assistant reply.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Send a streaming completion request and return a stream of response chunks.
    ///
    /// The stream is finite and cannot be restarted. Dropping it cancels the
    /// underlying request.
    async fn complete_stream(&self, _request: &LlmRequest) -> Result<LlmStream> {
        Err(Error::Agent(format!(
            "provider '{}' does not support streaming",
            self.provider_id()
        )))
    }
}

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmStreamResponse>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Assistant message, possibly carrying tool calls.
    pub message: ChatMessage,
    pub model: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamResponse {
    pub delta: StreamContent,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamContent {
    Text(String),
    ToolUse(ToolUseDelta),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: String, // Partial JSON
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Decode tool-call arguments delivered as a JSON string.
///
/// Empty input means "no arguments"; text that is not valid JSON is kept as a
/// string value so the tool can still report what it received.
pub fn parse_tool_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
