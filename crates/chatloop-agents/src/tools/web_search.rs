use std::time::Duration;

use async_trait::async_trait;
use chatloop_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{Tool, ToolContext, ToolOutput, string_arg};

const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const TOOL_NAME: &str = "web_search";

/// Web search through the Tavily search API.
pub struct WebSearchTool {
    client: Client,
    api_key: String,
    base_url: String,
    max_results: u32,
}

impl WebSearchTool {
    pub fn new(api_key: String, max_results: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: TAVILY_BASE_URL.to_string(),
            max_results: max_results.max(1),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(self)
    }

    fn failure(reason: impl Into<String>) -> Error {
        Error::ToolInvocation {
            name: TOOL_NAME.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SearchResult {
    url: String,
    content: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Search the web for current information. Use this for recent events, \
         facts that may have changed, or anything you are not sure about. \
         Returns a JSON list of results with url and content."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let query = string_arg(TOOL_NAME, &args, "query")?;
        debug!(%query, max_results = self.max_results, "web search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                api_key: &self.api_key,
                query: &query,
                max_results: self.max_results,
            })
            .send()
            .await
            .map_err(|e| Self::failure(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::failure(format!(
                "search API error: status={}, body={}",
                status.as_u16(),
                body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Self::failure(format!("invalid search response: {e}")))?;

        if parsed.results.is_empty() {
            return Ok(ToolOutput::success(format!("No results found for '{query}'")));
        }

        let mut results = parsed.results;
        results.truncate(self.max_results as usize);
        Ok(ToolOutput::success(serde_json::to_string(&results)?))
    }
}
