//! Product index trait.
//!
//! Covers both the catalogue search used by the orchestration pipeline and the
//! per-product chunk store used by feature extraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::index::Predicate;
use crate::types::{Category, Product};

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector similarity only.
    Semantic,
    /// Keyword (BM25) only.
    Lexical,
    /// Blend of both.
    Hybrid,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Hybrid => "hybrid",
        })
    }
}

/// A product with its retrieval certainty in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredProduct {
    pub product: Product,
    pub certainty: f64,
}

impl ScoredProduct {
    pub fn new(product: Product, certainty: f64) -> Self {
        Self {
            product,
            certainty: certainty.clamp(0.0, 1.0),
        }
    }

    pub fn id(&self) -> &str {
        &self.product.product_id
    }
}

/// A route descriptor match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteHit {
    pub category: Category,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Where a stored chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSource {
    RawData,
    SearchResult,
}

/// A retrievable passage scoped to one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_text: String,
    pub source_type: ChunkSource,
}

/// Vector / lexical product index.
#[async_trait]
pub trait ProductIndex: Send + Sync {
    /// Search the catalogue. `filters` narrows the candidate set before scoring.
    async fn search_products(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&Predicate>,
        mode: SearchMode,
    ) -> Result<Vec<ScoredProduct>, IndexError>;

    /// Match a message against the per-category route descriptors, best first.
    async fn search_routes(&self, query: &str) -> Result<Vec<RouteHit>, IndexError>;

    /// Store raw vendor text for a product and chunk it. Returns the chunk count.
    async fn store_raw_data(&self, product_id: &str, text: &str) -> Result<usize, IndexError>;

    /// Chunks for `product_id` most relevant to `probe`.
    async fn get_relevant_chunks(
        &self,
        product_id: &str,
        probe: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>, IndexError>;

    /// Persist a web-search passage under a product so later chunk lookups see it.
    async fn store_search_results(
        &self,
        product_id: &str,
        query: &str,
        content: &str,
        source: &str,
    ) -> Result<(), IndexError>;
}
