pub mod openai;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use openai::OpenAiProvider;
pub use providers::{
    LlmProvider, LlmRequest, LlmResponse, LlmStream, LlmStreamResponse, StreamContent,
    ToolDefinition, ToolUseDelta, Usage, parse_tool_arguments,
};
pub use runtime::{TurnExecutor, TurnOutcome};
pub use tools::{Tool, ToolContext, ToolDescription, ToolOutput, ToolRegistry, build_registry};
