//! Tavily-backed web searcher.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::security::SecretString;
use crate::traits::{WebSearchHit, WebSearcher};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Web search through Tavily's search API.
pub struct TavilyWebSearcher {
    api_key: SecretString,
    client: Client,
    endpoint: String,
    /// Results requested per query.
    pub max_results: usize,
    /// `"basic"` or `"advanced"`.
    pub search_depth: String,
}

impl TavilyWebSearcher {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            endpoint: TAVILY_URL.to_string(),
            max_results: 5,
            search_depth: "advanced".to_string(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Point at a different endpoint (proxies, local stubs).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    exclude_domains: &'a [String],
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
}

#[async_trait]
impl WebSearcher for TavilyWebSearcher {
    async fn search(
        &self,
        query: &str,
        exclude_domains: &[String],
    ) -> Result<Vec<WebSearchHit>, SearchError> {
        let request = Request {
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
            exclude_domains,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "Tavily API error");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Response = response.json().await?;
        let hits: Vec<WebSearchHit> = body
            .results
            .into_iter()
            .filter_map(|r| {
                let content = r.raw_content.or(r.content).filter(|c| !c.trim().is_empty())?;
                Some(WebSearchHit::new(query, content, r.url))
            })
            .collect();

        debug!(query, excluded = exclude_domains.len(), hits = hits.len(), "Tavily search");
        Ok(hits)
    }
}

impl std::fmt::Debug for TavilyWebSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyWebSearcher")
            .field("api_key", &self.api_key)
            .field("endpoint", &self.endpoint)
            .field("max_results", &self.max_results)
            .finish()
    }
}
