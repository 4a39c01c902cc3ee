//! `get_wikipedia` — fetch an article summary from the Wikipedia REST API.

use std::time::Duration;

use async_trait::async_trait;
use counsel_core::{Tool, ToolError};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

const DEFAULT_API: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/";

pub struct WikipediaTool {
    api_base: Url,
    client: reqwest::Client,
}

impl WikipediaTool {
    /// English Wikipedia.
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API).expect("default Wikipedia URL is valid")
    }

    /// Point at another summary endpoint (a different language edition, a
    /// mirror, or a local test server).
    pub fn with_api_base(api_base: &str) -> Result<Self, ToolError> {
        let api_base = Url::parse(api_base).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_wikipedia".into(),
            reason: format!("invalid API base '{api_base}': {e}"),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("counsel/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        Ok(Self { api_base, client })
    }

    /// The summary URL for `term`; spaces become underscores and the title
    /// is percent-encoded as one path segment.
    pub fn summary_url(&self, term: &str) -> Url {
        let title = term.trim().replace(' ', "_");
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&title);
        }
        url
    }

    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }
}

impl Default for WikipediaTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Summary {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "get_wikipedia"
    }

    fn description(&self) -> &str {
        "Look up a topic on Wikipedia and return the article title, a short description and its summary."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "term": {
                    "type": "string",
                    "description": "The topic or article title to look up"
                }
            },
            "required": ["term"]
        })
    }

    fn reentrant(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let term = arguments["term"].as_str().unwrap_or_default().trim();
        if term.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool_name: self.name().into(),
                reason: "'term' must not be empty".into(),
            });
        }

        let url = self.summary_url(term);
        debug!(%url, "Fetching Wikipedia summary");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.failure(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(self.failure(format!("no Wikipedia article found for '{term}'")));
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), term, "Wikipedia returned an error");
            return Err(self.failure(format!("Wikipedia returned HTTP {}", status.as_u16())));
        }

        let summary: Summary = response
            .json()
            .await
            .map_err(|e| self.failure(format!("unexpected response: {e}")))?;

        Ok(summary_to_value(summary))
    }
}

fn summary_to_value(summary: Summary) -> Value {
    let url = summary
        .content_urls
        .and_then(|u| u.desktop)
        .map(|d| d.page);
    json!({
        "title": summary.title,
        "description": summary.description,
        "summary": summary.extract,
        "url": url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_url_encodes_title() {
        let tool = WikipediaTool::new();
        assert_eq!(
            tool.summary_url("Ada Lovelace").as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/Ada_Lovelace"
        );
        assert_eq!(
            tool.summary_url("C/C++").as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/C%2FC++"
        );
    }

    #[test]
    fn custom_base_without_trailing_slash() {
        let tool = WikipediaTool::with_api_base("http://localhost:9/summary").unwrap();
        assert_eq!(tool.summary_url("Rust").as_str(), "http://localhost:9/summary/Rust");
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(WikipediaTool::with_api_base("not a url").is_err());
    }

    #[test]
    fn summary_json_is_flattened() {
        let summary: Summary = serde_json::from_value(json!({
            "title": "Rust (programming language)",
            "description": "General-purpose programming language",
            "extract": "Rust is a language...",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Rust"}}
        }))
        .unwrap();
        let v = summary_to_value(summary);
        assert_eq!(v["title"], "Rust (programming language)");
        assert_eq!(v["summary"], "Rust is a language...");
        assert_eq!(v["url"], "https://en.wikipedia.org/wiki/Rust");
    }

    #[tokio::test]
    async fn empty_term_is_rejected() {
        let err = WikipediaTool::new()
            .execute(json!({"term": " "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
