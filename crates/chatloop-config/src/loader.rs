use std::path::{Path, PathBuf};

use chatloop_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Builds an [`AppConfig`] from an optional file, a `.env` file, and the
/// process environment, in that order of precedence (later wins).
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    skip_dotenv: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    /// Load and validate against the real process environment.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.skip_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!("loaded environment from {}", path.display()),
                Err(e) if e.not_found() => {}
                Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
            }
        }
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Load and validate using `env` as the environment lookup.
    pub fn load_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
        let mut config = match &self.path {
            Some(path) => Self::parse_file(path)?,
            None => AppConfig::default(),
        };
        apply_env_overrides(&mut config, env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML (`.yaml`/`.yml`) or TOML (`.toml`) config file.
    pub fn parse_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config {}: {e}", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid YAML in {}: {e}", path.display()))),
            Some("toml") => toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid TOML in {}: {e}", path.display()))),
            other => Err(Error::Config(format!(
                "unsupported config format {:?} for {} (use .yaml, .yml or .toml)",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

/// Environment variables that override file values.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("OPENAI_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(url) = non_empty("OPENAI_BASE_URL") {
        config.llm.base_url = Some(url);
    }
    if let Some(model) = non_empty("CHATLOOP_MODEL") {
        config.llm.model = model;
    }
    if let Some(key) = non_empty("TAVILY_API_KEY") {
        config.tools.web_search.api_key = Some(key);
    }
    if let Some(host) = non_empty("CHATLOOP_HOST") {
        config.gateway.host = host;
    }
    if let Some(port) = non_empty("CHATLOOP_PORT") {
        config.gateway.port = port
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid CHATLOOP_PORT '{port}': {e}")))?;
    }
    Ok(())
}
