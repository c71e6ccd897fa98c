use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chatloop_common::{ChatMessage, ChatRole, Error, Result, ToolCall};
use chatloop_config::AppConfig;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::openai::OpenAiProvider;
use crate::providers::{
    LlmProvider, LlmRequest, LlmStream, StreamContent, ToolDefinition, parse_tool_arguments,
};
use crate::tools::{ToolContext, ToolOutput, ToolRegistry, build_registry};

/// Default cap on model invocations that request tools within one turn.
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// Inserted between the text of consecutive model steps in a streamed turn.
const STEP_SEPARATOR: &str = "\n\n";

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Input log plus every message the turn appended.
    pub log: Vec<ChatMessage>,
    /// Final assistant message (also the last entry of `log`).
    pub reply: ChatMessage,
    pub model_calls: usize,
}

impl TurnOutcome {
    /// Messages appended after the first `prior_len` entries of the log.
    pub fn into_new_messages(mut self, prior_len: usize) -> Vec<ChatMessage> {
        self.log.split_off(prior_len.min(self.log.len()))
    }
}

/// Runs the tool-augmented loop: call the model, dispatch any requested
/// tools, feed the results back, repeat until the model answers without tools.
pub struct TurnExecutor {
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    model: String,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    max_tool_iterations: usize,
}

impl TurnExecutor {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: ToolRegistry) -> Self {
        Self {
            provider,
            tools,
            model: String::new(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
        }
    }

    /// Wire an executor from configuration with the given provider and tools.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
    ) -> Self {
        let mut executor = Self::new(provider, tools);
        executor.set_model(config.llm.model.clone());
        if let Some(prompt) = &config.agent.system_prompt {
            executor.set_system_prompt(prompt.clone());
        }
        executor.max_tokens = config.llm.max_tokens;
        executor.temperature = config.llm.temperature;
        executor.set_max_tool_iterations(config.agent.max_tool_iterations);
        executor
    }

    /// Build the OpenAI provider and the enabled built-in tools from configuration.
    pub fn build(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.llm.request_timeout_secs);
        let api_key = config
            .llm
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY not found".into()))?;
        let provider = OpenAiProvider::new(api_key, config.llm.base_url.clone())
            .with_model(config.llm.model.clone())
            .with_timeout(timeout)?;
        info!("registered LLM provider: {}", provider.provider_id());

        let tools = build_registry(&config.tools, timeout)?;
        Ok(Self::from_config(config, Arc::new(provider), tools))
    }

    pub fn set_model(&mut self, model: String) {
        self.model = model;
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Some(prompt);
    }

    /// Values below 1 are raised to 1.
    pub fn set_max_tool_iterations(&mut self, limit: usize) {
        self.max_tool_iterations = limit.max(1);
    }

    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Run one turn to completion.
    ///
    /// `log` must end with a user or tool-result message. On success the
    /// returned log is `log` followed by the assistant and tool messages the
    /// turn produced. On error nothing is returned, so callers have nothing to
    /// commit.
    #[instrument(skip(self, log, context), fields(thread_id = ?context.thread_id, history = log.len()))]
    pub async fn run_turn(
        &self,
        mut log: Vec<ChatMessage>,
        context: &ToolContext,
    ) -> Result<TurnOutcome> {
        ensure_turn_input(&log)?;
        let tool_defs = self.tools.definitions();

        for iteration in 0..self.max_tool_iterations {
            let request = self.build_request(&log, &tool_defs);
            let response = self.provider.complete(&request).await?;
            let reply = assign_missing_call_ids(response.message);
            log.push(reply.clone());

            if !reply.has_tool_calls() {
                debug!(model_calls = iteration + 1, "turn finished");
                return Ok(TurnOutcome {
                    log,
                    reply,
                    model_calls: iteration + 1,
                });
            }

            let results = self.dispatch_tools(&reply.tool_calls, context).await;
            log.extend(results);
        }

        warn!(limit = self.max_tool_iterations, "tool loop limit reached");
        Err(Error::ToolLoopExceeded {
            limit: self.max_tool_iterations,
        })
    }

    /// Same loop as [`run_turn`](Self::run_turn), forwarding model text to
    /// `delta_tx` as it is generated.
    ///
    /// Tool calls are assembled from stream fragments and dispatched between
    /// model steps; only model text reaches the sink. If the receiver is gone
    /// the turn stops with [`Error::Cancelled`].
    #[instrument(skip(self, log, context, delta_tx), fields(thread_id = ?context.thread_id, history = log.len()))]
    pub async fn run_turn_streaming(
        &self,
        mut log: Vec<ChatMessage>,
        context: &ToolContext,
        delta_tx: mpsc::Sender<String>,
    ) -> Result<TurnOutcome> {
        ensure_turn_input(&log)?;
        let tool_defs = self.tools.definitions();
        let mut streamed_text = false;

        for iteration in 0..self.max_tool_iterations {
            if delta_tx.is_closed() {
                return Err(cancelled());
            }

            let request = self.build_request(&log, &tool_defs);

            // Fall back to a plain completion only when the provider cannot
            // stream. An unreachable model is reported as is.
            let reply = match self.provider.complete_stream(&request).await {
                Ok(stream) => collect_stream(stream, &delta_tx).await?,
                Err(Error::Agent(reason)) => {
                    debug!(
                        provider = self.provider.provider_id(),
                        "streaming unsupported, falling back to non-streaming: {}", reason
                    );
                    let response = self.provider.complete(&request).await?;
                    if !response.message.content.is_empty() {
                        forward(&delta_tx, response.message.content.clone()).await?;
                    }
                    assign_missing_call_ids(response.message)
                }
                Err(e) => return Err(e),
            };
            streamed_text |= !reply.content.is_empty();
            log.push(reply.clone());

            if !reply.has_tool_calls() {
                debug!(model_calls = iteration + 1, "streamed turn finished");
                return Ok(TurnOutcome {
                    log,
                    reply,
                    model_calls: iteration + 1,
                });
            }

            let results = self.dispatch_tools(&reply.tool_calls, context).await;
            log.extend(results);

            if streamed_text {
                forward(&delta_tx, STEP_SEPARATOR.to_string()).await?;
            }
        }

        warn!(limit = self.max_tool_iterations, "tool loop limit reached");
        Err(Error::ToolLoopExceeded {
            limit: self.max_tool_iterations,
        })
    }

    fn build_request(&self, log: &[ChatMessage], tool_defs: &[ToolDefinition]) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            messages: log.to_vec(),
            system: self.system_prompt.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tool_defs.to_vec(),
        }
    }

    /// Invoke each call in order. Lookup and execution failures become
    /// tool-role error messages so the model can react to them.
    async fn dispatch_tools(&self, calls: &[ToolCall], context: &ToolContext) -> Vec<ChatMessage> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match self.tools.lookup(&call.name) {
                Ok(tool) => {
                    debug!(tool = %call.name, call_id = %call.id, "dispatching tool");
                    tool.execute(context, call.arguments.clone())
                        .await
                        .unwrap_or_else(|e| tool_failure(&call.name, e))
                }
                Err(e) => tool_failure(&call.name, e),
            };
            if output.is_error {
                debug!(tool = %call.name, call_id = %call.id, "tool reported an error to the model");
            }
            results.push(ChatMessage::tool_result(call.id.clone(), output.content));
        }
        results
    }
}

/// Render a failed lookup or execution as a tool-role error.
fn tool_failure(tool: &str, err: Error) -> ToolOutput {
    if err.is_recoverable_tool_error() {
        warn!(tool, "tool failed: {}", err);
    } else {
        error!(tool, "tool failed unexpectedly: {}", err);
    }
    ToolOutput::error(err.to_string())
}

/// Tool replies are correlated by id, so every call needs a non-empty one.
fn assign_missing_call_ids(mut message: ChatMessage) -> ChatMessage {
    for (index, call) in message.tool_calls.iter_mut().enumerate() {
        if call.id.is_empty() {
            call.id = format!("call_{index}");
        }
    }
    message
}

fn ensure_turn_input(log: &[ChatMessage]) -> Result<()> {
    match log.last().map(|m| m.role) {
        Some(ChatRole::User | ChatRole::Tool) => Ok(()),
        Some(role) => Err(Error::Agent(format!(
            "turn input must end with a user or tool message, got {role:?}"
        ))),
        None => Err(Error::Agent("turn input log is empty".into())),
    }
}

fn cancelled() -> Error {
    Error::Cancelled("stream receiver dropped".into())
}

async fn forward(delta_tx: &mpsc::Sender<String>, text: String) -> Result<()> {
    delta_tx.send(text).await.map_err(|_| cancelled())
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    input: String,
}

/// Drain one model stream into an assistant message, forwarding text as it arrives.
async fn collect_stream(mut stream: LlmStream, delta_tx: &mpsc::Sender<String>) -> Result<ChatMessage> {
    let mut text = String::new();
    let mut partial: BTreeMap<u32, PartialToolCall> = BTreeMap::new();

    while let Some(chunk) = stream.next().await {
        match chunk?.delta {
            StreamContent::Text(fragment) => {
                if fragment.is_empty() {
                    continue;
                }
                text.push_str(&fragment);
                forward(delta_tx, fragment).await?;
            }
            StreamContent::ToolUse(delta) => {
                let entry = partial.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    entry.id = id;
                }
                if let Some(name) = delta.name {
                    entry.name = name;
                }
                entry.input.push_str(&delta.input);
            }
        }
    }

    let tool_calls = partial
        .into_iter()
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() {
                format!("call_{index}")
            } else {
                call.id
            },
            name: call.name,
            arguments: parse_tool_arguments(&call.input),
        })
        .collect();

    Ok(ChatMessage::assistant_with_tool_calls(text, tool_calls))
}
