use std::time::Duration;

use async_trait::async_trait;
use chatloop_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Tool, ToolContext, ToolOutput, string_arg};

const TOOL_NAME: &str = "wikipedia";
const NO_RESULT: &str = "No good Wikipedia Search Result was found";

/// Encyclopedia lookup against the MediaWiki query API.
pub struct WikipediaTool {
    client: Client,
    base_url: String,
    top_k_results: usize,
    doc_content_chars_max: usize,
}

impl WikipediaTool {
    pub fn new(lang: &str, top_k_results: usize, doc_content_chars_max: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("https://{lang}.wikipedia.org/w/api.php"),
            top_k_results: top_k_results.max(1),
            doc_content_chars_max,
        }
    }

    /// Full URL of the `api.php` endpoint.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
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

#[derive(Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    extract: String,
}

/// Render pages as `Page: ... / Summary: ...` blocks, cut at `max_chars` characters.
fn format_pages(mut pages: Vec<Page>, top_k: usize, max_chars: usize) -> String {
    pages.sort_by_key(|p| p.index);
    let summaries: Vec<String> = pages
        .into_iter()
        .filter(|p| !p.extract.trim().is_empty())
        .take(top_k)
        .map(|p| format!("Page: {}\nSummary: {}", p.title, p.extract.trim()))
        .collect();

    if summaries.is_empty() {
        return NO_RESULT.to_string();
    }
    summaries.join("\n\n").chars().take(max_chars).collect()
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Look up a topic on Wikipedia. Useful for general questions about people, \
         places, companies, facts, historical events, or other subjects. \
         Input should be a search query."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let query = string_arg(TOOL_NAME, &args, "query")?;
        debug!(%query, "wikipedia lookup");

        let limit = self.top_k_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", query.as_str()),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
            ])
            .send()
            .await
            .map_err(|e| Self::failure(format!("lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure(format!(
                "wikipedia API error: status={}",
                status.as_u16()
            )));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::failure(format!("invalid wikipedia response: {e}")))?;

        let pages = parsed.query.map(|q| q.pages).unwrap_or_default();
        Ok(ToolOutput::success(format_pages(
            pages,
            self.top_k_results,
            self.doc_content_chars_max,
        )))
    }
}
