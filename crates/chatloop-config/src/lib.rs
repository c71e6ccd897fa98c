pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AgentConfig, AppConfig, GatewayConfig, LlmProviderConfig, PythonReplConfig, ToolsConfig,
    WebSearchConfig, WikipediaConfig,
};
