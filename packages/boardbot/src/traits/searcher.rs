//! Open-web search trait used by the feature extraction loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SearchError;

/// One passage returned by a web search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchHit {
    /// The query that produced this hit.
    pub search_query: String,
    /// Extracted page content.
    pub search_result: String,
    /// Page URL.
    pub data_source: String,
}

impl WebSearchHit {
    pub fn new(
        search_query: impl Into<String>,
        search_result: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Self {
        Self {
            search_query: search_query.into(),
            search_result: search_result.into(),
            data_source: data_source.into(),
        }
    }

    /// Host of `data_source`, used as the exclusion key.
    pub fn domain(&self) -> String {
        source_domain(&self.data_source)
    }
}

/// Reduce a URL to its host. Inputs that don't parse are returned as-is.
pub fn source_domain(source: &str) -> String {
    Url::parse(source)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| source.trim().to_string())
}

/// Web search provider.
///
/// # Implementations
///
/// - `TavilyWebSearcher` - Tavily API
/// - `MockWebSearcher` - for testing
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search the web, skipping results hosted on any of `exclude_domains`.
    async fn search(
        &self,
        query: &str,
        exclude_domains: &[String],
    ) -> Result<Vec<WebSearchHit>, SearchError>;
}

/// Searcher used when no provider is configured. Every call fails with
/// [`SearchError::Disabled`], which the extraction loop treats as missing data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledWebSearcher;

#[async_trait]
impl WebSearcher for DisabledWebSearcher {
    async fn search(&self, _query: &str, _exclude: &[String]) -> Result<Vec<WebSearchHit>, SearchError> {
        Err(SearchError::Disabled)
    }
}
