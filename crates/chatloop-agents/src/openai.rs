use crate::providers::{
    LlmProvider, LlmRequest, LlmResponse, LlmStream, LlmStreamResponse, StreamContent,
    ToolUseDelta, Usage, parse_tool_arguments,
};
use async_trait::async_trait;
use bytes::Bytes;
use chatloop_common::{ChatMessage, ChatRole, Error, Result, ToolCall};
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: "gpt-4o-mini".to_string(),
        }
    }

    /// Model used when a request leaves `model` empty.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_completion(&self, body: &OpenAiRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %body.model, stream = body.stream, "sending OpenAI request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::ModelUnavailable(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::ModelUnavailable(format!(
                "OpenAI API error: status={}, body={}",
                status.as_u16(),
                error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.convert_request(request, false);
        let response = self.post_completion(&body).await?;

        let openai_response: OpenAiResponse = response.json().await.map_err(|e| {
            Error::ModelUnavailable(format!("failed to parse OpenAI response: {e}"))
        })?;

        convert_response(openai_response)
    }

    async fn complete_stream(&self, request: &LlmRequest) -> Result<LlmStream> {
        let body = self.convert_request(request, true);
        let response = self.post_completion(&body).await?;
        Ok(Box::pin(SseParser::new(response.bytes_stream())))
    }
}

impl OpenAiProvider {
    fn convert_request(&self, request: &LlmRequest, stream: bool) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system_prompt) = &request.system {
            messages.push(OpenAiMessage::System {
                content: system_prompt.clone(),
            });
        }
        messages.extend(request.messages.iter().map(convert_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAiTool {
                        kind: "function".to_string(),
                        function: OpenAiFunctionDefinition {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        let model = if request.model.trim().is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        OpenAiRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            stream,
            stream_options: stream.then_some(OpenAiStreamOptions {
                include_usage: true,
            }),
        }
    }
}

fn convert_message(msg: &ChatMessage) -> OpenAiMessage {
    match msg.role {
        ChatRole::System => OpenAiMessage::System {
            content: msg.content.clone(),
        },
        ChatRole::User => OpenAiMessage::User {
            content: msg.content.clone(),
        },
        ChatRole::Assistant => {
            let tool_calls: Vec<OpenAiToolCall> = msg
                .tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: match &call.arguments {
                            serde_json::Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                })
                .collect();

            OpenAiMessage::Assistant {
                content: (!msg.content.is_empty()).then(|| msg.content.clone()),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            }
        }
        ChatRole::Tool => OpenAiMessage::Tool {
            tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            content: msg.content.clone(),
        },
    }
}

fn convert_response(response: OpenAiResponse) -> Result<LlmResponse> {
    let OpenAiResponse {
        model,
        choices,
        usage,
        ..
    } = response;
    let choice = choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::ModelUnavailable("no choices in OpenAI response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, tc)| ToolCall {
            arguments: parse_tool_arguments(&tc.function.arguments),
            // Some compatible servers send an empty id; the tool reply still needs one.
            id: if tc.id.is_empty() {
                format!("call_{index}")
            } else {
                tc.id
            },
            name: tc.function.name,
        })
        .collect();

    Ok(LlmResponse {
        message: ChatMessage::assistant_with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        ),
        model,
        usage: usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        stop_reason: choice.finish_reason,
    })
}

// Request Types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAiStreamOptions>,
}

#[derive(Serialize)]
struct OpenAiStreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionDefinition,
}

#[derive(Serialize)]
struct OpenAiFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response Types
#[derive(Deserialize)]
struct OpenAiResponse {
    #[allow(dead_code)]
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// Stream Parser
struct SseParser {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    queue: VecDeque<Result<LlmStreamResponse>>,
    done: bool,
}

impl SseParser {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            buffer: Vec::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Split complete events off the buffer and queue their parsed chunks.
    fn drain_events(&mut self) {
        while let Some((pos, len)) = find_event_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..len);

            let Ok(event) = String::from_utf8(event) else {
                continue;
            };
            for line in event.lines() {
                self.handle_line(line);
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data.trim() == "[DONE]" {
            self.done = true;
            return;
        }

        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.queue.push_back(Err(Error::ModelUnavailable(format!(
                    "invalid OpenAI stream chunk: {e}"
                ))));
                return;
            }
        };

        for choice in chunk.choices {
            let mut yielded = false;

            if let Some(content) = choice.delta.content {
                self.queue.push_back(Ok(LlmStreamResponse {
                    delta: StreamContent::Text(content),
                    usage: None,
                    stop_reason: choice.finish_reason.clone(),
                }));
                yielded = true;
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                self.queue.push_back(Ok(LlmStreamResponse {
                    delta: StreamContent::ToolUse(ToolUseDelta {
                        index: tc.index,
                        id: tc.id,
                        name,
                        input: arguments,
                    }),
                    usage: None,
                    stop_reason: choice.finish_reason.clone(),
                }));
                yielded = true;
            }

            if !yielded {
                if let Some(reason) = choice.finish_reason {
                    self.queue.push_back(Ok(LlmStreamResponse {
                        delta: StreamContent::Text(String::new()),
                        usage: None,
                        stop_reason: Some(reason),
                    }));
                }
            }
        }

        if let Some(usage) = chunk.usage {
            self.queue.push_back(Ok(LlmStreamResponse {
                delta: StreamContent::Text(String::new()),
                usage: Some(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                }),
                stop_reason: None,
            }));
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

impl Stream for SseParser {
    type Item = Result<LlmStreamResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.drain_events();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(Error::ModelUnavailable(format!(
                        "OpenAI stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing event that was not followed by a blank line.
                    if !self.buffer.is_empty() {
                        self.buffer.extend_from_slice(b"\n\n");
                        self.drain_events();
                    }
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// Stream Response Types
#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiStreamFunctionCall>,
}

#[derive(Deserialize)]
struct OpenAiStreamFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolDefinition;

    fn request(messages: Vec<ChatMessage>) -> LlmRequest {
        LlmRequest {
            model: String::new(),
            messages,
            system: Some("be brief".into()),
            max_tokens: Some(64),
            temperature: None,
            tools: vec![],
        }
    }

    #[test]
    fn convert_request_puts_system_first_and_uses_default_model() {
        let provider = OpenAiProvider::new("k".into(), None).with_model("gpt-4o-mini");
        let body = provider.convert_request(&request(vec![ChatMessage::user("hi")]), false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("tools").is_none());
        assert!(json.get("stream_options").is_none());
    }

    #[test]
    fn convert_request_encodes_tool_round_trip() {
        let provider = OpenAiProvider::new("k".into(), None);
        let mut req = request(vec![
            ChatMessage::user("weather?"),
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "web_search".into(),
                    arguments: serde_json::json!({"query": "weather"}),
                }],
            ),
            ChatMessage::tool_result("call_1", "sunny"),
        ]);
        req.tools.push(ToolDefinition {
            name: "web_search".into(),
            description: "search".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });

        let json = serde_json::to_value(provider.convert_request(&req, true)).unwrap();
        let assistant = &json["messages"][2];
        assert!(assistant.get("content").is_none());
        assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"weather\"}"
        );
        assert_eq!(json["messages"][3]["role"], "tool");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["stream_options"]["include_usage"], true);
    }

    #[test]
    fn event_boundary_prefers_earliest_delimiter() {
        assert_eq!(find_event_boundary(b"data: a\n\ndata: b\r\n\r\n"), Some((7, 2)));
        assert_eq!(find_event_boundary(b"data: a\r\n\r\n"), Some((7, 4)));
        assert_eq!(find_event_boundary(b"data: partial"), None);
    }
}
