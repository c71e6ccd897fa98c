use chatloop_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Answer the questions asked. \
     Be as precise, clear and professional as possible.";

/// Top-level configuration, built once at startup and passed down explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmProviderConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Message returned by the liveness probe at `GET /`.
    pub welcome_message: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            welcome_message: "chatloop server running".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub request_timeout_secs: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    /// Cap on consecutive tool-requesting model replies within one turn.
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tool_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub web_search: WebSearchConfig,
    pub wikipedia: WikipediaConfig,
    pub python_repl: PythonReplConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub max_results: u32,
    pub base_url: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            max_results: 2,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaConfig {
    pub enabled: bool,
    pub top_k_results: usize,
    pub doc_content_chars_max: usize,
    pub lang: String,
    pub base_url: Option<String>,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k_results: 1,
            doc_content_chars_max: 200,
            lang: "en".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonReplConfig {
    pub enabled: bool,
    pub interpreter: String,
    pub timeout_secs: u64,
}

impl Default for PythonReplConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interpreter: "python3".to_string(),
            timeout_secs: 10,
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

impl AppConfig {
    /// Startup checks. Any failure here is fatal for the process.
    pub fn validate(&self) -> Result<()> {
        if self.llm.provider != "openai" {
            return Err(Error::Config(format!(
                "unsupported LLM provider '{}' (supported: openai)",
                self.llm.provider
            )));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".into()));
        }
        if is_blank(&self.llm.api_key) {
            return Err(Error::Config(
                "OPENAI_API_KEY not found; set it in the environment or llm.api_key".into(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(Error::Config(
                "agent.max_tool_iterations must be at least 1".into(),
            ));
        }
        if self.tools.web_search.enabled && is_blank(&self.tools.web_search.api_key) {
            return Err(Error::Config(
                "TAVILY_API_KEY not found; set it or disable tools.web_search".into(),
            ));
        }
        if self.tools.python_repl.enabled && self.tools.python_repl.interpreter.trim().is_empty() {
            return Err(Error::Config(
                "tools.python_repl.interpreter must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-test".into());
        config.tools.web_search.api_key = Some("tvly-test".into());
        config
    }

    #[test]
    fn defaults_follow_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.agent.max_tool_iterations, 10);
        assert_eq!(config.tools.web_search.max_results, 2);
        assert_eq!(config.tools.wikipedia.top_k_results, 1);
        assert_eq!(config.tools.wikipedia.doc_content_chars_max, 200);
        assert!(!config.tools.python_repl.enabled);
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }

    #[test]
    fn missing_model_key_is_fatal() {
        let mut config = valid_config();
        config.llm.api_key = Some("   ".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn missing_search_key_only_matters_when_enabled() {
        let mut config = valid_config();
        config.tools.web_search.api_key = None;
        assert!(config.validate().unwrap_err().to_string().contains("TAVILY_API_KEY"));

        config.tools.web_search.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_iteration_cap_is_rejected() {
        let mut config = valid_config();
        config.agent.max_tool_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = valid_config();
        config.llm.provider = "carrier-pigeon".into();
        assert!(config.validate().unwrap_err().to_string().contains("unsupported"));
    }
}
