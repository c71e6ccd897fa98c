mod python_repl;
mod registry;
mod web_search;
mod wikipedia;

pub use python_repl::PythonReplTool;
pub use registry::{ToolDescription, ToolRegistry};
pub use web_search::WebSearchTool;
pub use wikipedia::WikipediaTool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatloop_common::{Result, ThreadId};
use chatloop_config::ToolsConfig;
use tracing::info;

/// Per-call context handed to a tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Thread the turn belongs to; `None` for single-shot turns.
    pub thread_id: Option<ThreadId>,
}

/// Result of a tool execution, fed back to the model as a tool-role message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: format!("Error: {}", content.into()),
            is_error: true,
        }
    }
}

/// Trait for capabilities the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the `arguments` object.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}

/// Pull a required string argument out of a tool call's arguments.
///
/// Models sometimes send the bare string instead of an object, so a string
/// value is accepted as the argument itself.
pub(crate) fn string_arg(tool: &str, args: &serde_json::Value, key: &str) -> Result<String> {
    let value = match args {
        serde_json::Value::String(raw) => Some(raw.as_str()),
        other => other.get(key).and_then(|v| v.as_str()),
    };
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| chatloop_common::Error::ToolInvocation {
            name: tool.to_string(),
            reason: format!("missing or invalid '{key}' argument"),
        })
}

/// Build the registry of built-in tools enabled in `config`, in a fixed order:
/// web search, encyclopedia, code execution.
pub fn build_registry(config: &ToolsConfig, request_timeout: Duration) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    if config.web_search.enabled {
        let api_key = config.web_search.api_key.clone().unwrap_or_default();
        let mut tool = WebSearchTool::new(api_key, config.web_search.max_results)
            .with_timeout(request_timeout)?;
        if let Some(base_url) = &config.web_search.base_url {
            tool = tool.with_base_url(base_url.clone());
        }
        registry.register(Arc::new(tool))?;
    }

    if config.wikipedia.enabled {
        let mut tool = WikipediaTool::new(
            &config.wikipedia.lang,
            config.wikipedia.top_k_results,
            config.wikipedia.doc_content_chars_max,
        )
        .with_timeout(request_timeout)?;
        if let Some(base_url) = &config.wikipedia.base_url {
            tool = tool.with_base_url(base_url.clone());
        }
        registry.register(Arc::new(tool))?;
    }

    if config.python_repl.enabled {
        registry.register(Arc::new(PythonReplTool::new(
            config.python_repl.interpreter.clone(),
            Duration::from_secs(config.python_repl.timeout_secs),
        )))?;
    }

    info!(tools = ?registry.names(), "tool registry ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_output_is_prefixed() {
        let output = ToolOutput::error("boom");
        assert!(output.is_error);
        assert_eq!(output.content, "Error: boom");
        assert!(!ToolOutput::success("fine").is_error);
    }

    #[test]
    fn string_arg_accepts_object_or_bare_string() {
        assert_eq!(
            string_arg("t", &json!({"query": " rust "}), "query").unwrap(),
            "rust"
        );
        assert_eq!(string_arg("t", &json!("rust"), "query").unwrap(), "rust");
        assert!(string_arg("t", &json!({"query": ""}), "query").is_err());
        assert!(string_arg("t", &json!({}), "query").is_err());
    }

    #[test]
    fn default_config_registers_search_and_wikipedia() {
        let mut config = ToolsConfig::default();
        config.web_search.api_key = Some("tvly-test".into());
        let registry = build_registry(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(registry.names(), ["web_search", "wikipedia"]);
    }

    #[test]
    fn disabled_tools_are_not_registered() {
        let mut config = ToolsConfig::default();
        config.web_search.enabled = false;
        config.wikipedia.enabled = false;
        config.python_repl.enabled = true;
        let registry = build_registry(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(registry.names(), ["python_repl"]);
    }
}
