//! Weaviate-backed product index.
//!
//! Searches go through the GraphQL endpoint (`nearText`, `bm25` or `hybrid`
//! with a `where` clause rendered from [`Predicate`]). Writes use the REST
//! `objects` endpoint. Chunks and search results are scoped by `product_id`.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::IndexError;
use crate::index::chunking::{chunk_text, ChunkConfig};
use crate::index::predicate::Predicate;
use crate::index::routes::RouteDescriptor;
use crate::security::SecretString;
use crate::traits::{Chunk, ChunkSource, ProductIndex, RouteHit, ScoredProduct, SearchMode};
use crate::types::{Attribute, Category, Product};

const PRODUCT_CLASS: &str = "Product";
const CHUNK_CLASS: &str = "ProductDataChunk";
const RAW_DATA_CLASS: &str = "RawProductData";
const SEARCH_RESULT_CLASS: &str = "ProductSearchResult";
const ROUTE_CLASS: &str = "Route";

/// Route hits examined per classification.
const ROUTE_CANDIDATES: usize = 3;

/// Weaviate index client.
pub struct WeaviateIndex {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    openai_key: Option<SecretString>,
    chunking: ChunkConfig,
    hybrid_alpha: f64,
    seen_results: Mutex<HashSet<String>>,
}

impl WeaviateIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            openai_key: None,
            chunking: ChunkConfig::default(),
            hybrid_alpha: 0.5,
            seen_results: Mutex::new(HashSet::new()),
        }
    }

    /// Bearer key for Weaviate Cloud instances.
    pub fn with_api_key(mut self, key: impl Into<SecretString>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Key forwarded to the `text2vec-openai` vectorizer module.
    pub fn with_openai_key(mut self, key: impl Into<SecretString>) -> Self {
        self.openai_key = Some(key.into());
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Weight of the vector score in hybrid search (0 = pure BM25, 1 = pure vector).
    pub fn with_hybrid_alpha(mut self, alpha: f64) -> Self {
        self.hybrid_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Index the route descriptor corpus. Returns the number of objects written.
    pub async fn load_routes(&self, routes: &[RouteDescriptor]) -> Result<usize, IndexError> {
        for descriptor in routes {
            self.create_object(
                ROUTE_CLASS,
                json!({
                    "route": descriptor.route.as_str(),
                    "description": descriptor.description,
                }),
            )
            .await?;
        }
        info!(count = routes.len(), "route descriptors indexed");
        Ok(routes.len())
    }

    /// Insert or replace a catalogue product.
    pub async fn upsert_product(&self, product: &Product) -> Result<String, IndexError> {
        let properties =
            serde_json::to_value(product).map_err(|e| IndexError::Decode(e.to_string()))?;
        self.create_object(PRODUCT_CLASS, properties).await
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key.expose()));
        }
        if let Some(key) = &self.openai_key {
            builder = builder.header("X-OpenAI-Api-Key", key.expose());
        }
        builder
    }

    async fn graphql(&self, query: String) -> Result<Value, IndexError> {
        let start = Instant::now();
        let response = self
            .request(self.http.post(format!("{}/v1/graphql", self.base_url)))
            .json(&json!({ "query": query }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "Weaviate GraphQL error");
            return Err(IndexError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(IndexError::Query(message));
            }
        }

        debug!(duration_ms = start.elapsed().as_millis(), "Weaviate GraphQL query");
        Ok(body)
    }

    async fn create_object(&self, class: &str, properties: Value) -> Result<String, IndexError> {
        let id = Uuid::now_v7().to_string();
        let response = self
            .request(self.http.post(format!("{}/v1/objects", self.base_url)))
            .json(&json!({ "class": class, "id": id, "properties": properties }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IndexError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(id)
    }

    async fn store_chunks(
        &self,
        product_id: &str,
        text: &str,
        source: ChunkSource,
        source_id: &str,
    ) -> Result<usize, IndexError> {
        let chunks = chunk_text(text, self.chunking);
        let source_type = match source {
            ChunkSource::RawData => "raw_data",
            ChunkSource::SearchResult => "search_result",
        };
        for chunk in &chunks {
            self.create_object(
                CHUNK_CLASS,
                json!({
                    "product_id": product_id,
                    "chunk_text": chunk,
                    "source_type": source_type,
                    "source_id": source_id,
                }),
            )
            .await?;
        }
        Ok(chunks.len())
    }
}

// =============================================================================
// Query rendering
// =============================================================================

fn search_clause(mode: SearchMode, query: &str, alpha: f64) -> String {
    let query = quote(query);
    match mode {
        SearchMode::Semantic => format!("nearText: {{concepts: [{query}]}}"),
        SearchMode::Lexical => format!("bm25: {{query: {query}}}"),
        SearchMode::Hybrid => format!("hybrid: {{query: {query}, alpha: {alpha}}}"),
    }
}

fn score_field(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Semantic => "certainty",
        SearchMode::Lexical | SearchMode::Hybrid => "score",
    }
}

fn product_properties() -> String {
    std::iter::once("product_id")
        .chain(Attribute::ALL.iter().map(|a| a.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn product_query(query: &str, limit: usize, filters: Option<&Predicate>, mode: SearchMode, alpha: f64) -> String {
    let mut clauses = vec![search_clause(mode, query, alpha), format!("limit: {limit}")];
    if let Some(predicate) = filters {
        clauses.push(format!("where: {}", predicate.to_graphql()));
    }
    format!(
        "{{ Get {{ {PRODUCT_CLASS}({}) {{ {} _additional {{ {} }} }} }} }}",
        clauses.join(", "),
        product_properties(),
        score_field(mode)
    )
}

fn chunk_query(product_id: &str, probe: &str, limit: usize) -> String {
    format!(
        "{{ Get {{ {CHUNK_CLASS}(nearText: {{concepts: [{}]}}, where: {{path: [\"product_id\"], operator: Equal, valueText: {}}}, limit: {limit}) {{ chunk_text source_type }} }} }}",
        quote(probe),
        quote(product_id)
    )
}

fn route_query(query: &str) -> String {
    format!(
        "{{ Get {{ {ROUTE_CLASS}(nearText: {{concepts: [{}]}}, limit: {ROUTE_CANDIDATES}) {{ route description _additional {{ certainty }} }} }} }}",
        quote(query)
    )
}

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn class_rows(body: &Value, class: &str) -> Result<Vec<Value>, IndexError> {
    body.pointer(&format!("/data/Get/{class}"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| IndexError::Decode(format!("missing data.Get.{class}")))
}

/// Weaviate returns `_additional` scores as strings for BM25 and hybrid.
fn additional_score(row: &Value, field: &str) -> f64 {
    match row.pointer(&format!("/_additional/{field}")) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn decode_products(rows: Vec<Value>, mode: SearchMode) -> Vec<ScoredProduct> {
    let field = score_field(mode);
    let raw: Vec<(Product, f64)> = rows
        .into_iter()
        .filter_map(|mut row| {
            let score = additional_score(&row, field);
            if let Some(object) = row.as_object_mut() {
                object.remove("_additional");
            }
            match serde_json::from_value::<Product>(row) {
                Ok(product) => Some((product, score)),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable product row");
                    None
                }
            }
        })
        .collect();

    // BM25 scores are unbounded; normalise against the best hit
    let max = raw.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    let scale = if mode != SearchMode::Semantic && max > 1.0 { max } else { 1.0 };

    raw.into_iter()
        .map(|(product, score)| ScoredProduct::new(product, score / scale))
        .collect()
}

fn content_hash(product_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(product_id.as_bytes());
    hasher.update([0]);
    hasher.update(content.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

// =============================================================================
// ProductIndex
// =============================================================================

#[async_trait]
impl ProductIndex for WeaviateIndex {
    async fn search_products(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&Predicate>,
        mode: SearchMode,
    ) -> Result<Vec<ScoredProduct>, IndexError> {
        let body = self
            .graphql(product_query(query, limit, filters, mode, self.hybrid_alpha))
            .await?;
        let products = decode_products(class_rows(&body, PRODUCT_CLASS)?, mode);
        debug!(mode = %mode, limit, hits = products.len(), "product search");
        Ok(products)
    }

    async fn search_routes(&self, query: &str) -> Result<Vec<RouteHit>, IndexError> {
        let body = self.graphql(route_query(query)).await?;
        let hits = class_rows(&body, ROUTE_CLASS)?
            .iter()
            .filter_map(|row| {
                let category = row.get("route")?.as_str()?.parse::<Category>().ok()?;
                Some(RouteHit {
                    category,
                    similarity: additional_score(row, "certainty").clamp(0.0, 1.0),
                })
            })
            .collect();
        Ok(hits)
    }

    async fn store_raw_data(&self, product_id: &str, text: &str) -> Result<usize, IndexError> {
        let source_id = self
            .create_object(RAW_DATA_CLASS, json!({ "product_id": product_id, "raw_data": text }))
            .await?;
        let count = self
            .store_chunks(product_id, text, ChunkSource::RawData, &source_id)
            .await?;
        info!(product_id, chunks = count, "raw data stored");
        Ok(count)
    }

    async fn get_relevant_chunks(
        &self,
        product_id: &str,
        probe: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>, IndexError> {
        let body = self.graphql(chunk_query(product_id, probe, limit)).await?;
        let chunks = class_rows(&body, CHUNK_CLASS)?
            .iter()
            .filter_map(|row| {
                let chunk_text = row.get("chunk_text")?.as_str()?.to_string();
                let source_type = match row.get("source_type").and_then(Value::as_str) {
                    Some("search_result") => ChunkSource::SearchResult,
                    _ => ChunkSource::RawData,
                };
                Some(Chunk {
                    chunk_text,
                    source_type,
                })
            })
            .collect();
        Ok(chunks)
    }

    async fn store_search_results(
        &self,
        product_id: &str,
        query: &str,
        content: &str,
        source: &str,
    ) -> Result<(), IndexError> {
        let hash = content_hash(product_id, content);
        let fresh = self
            .seen_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.clone());
        if !fresh {
            debug!(product_id, source, "skipping duplicate search result");
            return Ok(());
        }

        let source_id = self
            .create_object(
                SEARCH_RESULT_CLASS,
                json!({
                    "product_id": product_id,
                    "search_query": query,
                    "search_result": content,
                    "data_source": source,
                    "content_hash": hash,
                }),
            )
            .await?;
        self.store_chunks(product_id, content, ChunkSource::SearchResult, &source_id)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for WeaviateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaviateIndex")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("openai_key", &self.openai_key)
            .field("hybrid_alpha", &self.hybrid_alpha)
            .finish()
    }
}
