//! Testing utilities including mock implementations.
//!
//! These drive the pipelines end to end without network calls: a scripted
//! model, an in-process index and a scripted web searcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::ai::TokenCounter;
use crate::error::{IndexError, ModelError, SearchError};
use crate::index::{chunk_text, seed_routes, ChunkConfig, Predicate, RouteDescriptor};
use crate::services::Services;
use crate::traits::{
    Chunk, ChunkSource, Completion, GenerateRequest, LanguageModel, ProductIndex, RouteHit,
    ScoredProduct, SearchMode, WebSearchHit, WebSearcher,
};
use crate::types::{Category, Product};

/// Model whose encoding [`MockModel`] counts with when a request names none.
const DEFAULT_MODEL: &str = "gpt-4";

/// Services over a mock model, an empty [`MemoryIndex`] seeded with the
/// default routes, and a [`MockWebSearcher`] with no hits.
pub fn test_services(model: MockModel) -> Services {
    test_services_with_index(model, MemoryIndex::new())
}

pub fn test_services_with_index(model: MockModel, index: MemoryIndex) -> Services {
    Services::new(Arc::new(model), Arc::new(index), Arc::new(MockWebSearcher::new()))
}

pub fn test_services_full(model: MockModel, index: MemoryIndex, web: MockWebSearcher) -> Services {
    Services::new(Arc::new(model), Arc::new(index), Arc::new(web))
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Share of `query` words present in `text`.
fn coverage(query: &HashSet<String>, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let text = words(text);
    query.iter().filter(|w| text.contains(*w)).count() as f64 / query.len() as f64
}

/// Dice overlap between two word sets.
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    2.0 * a.intersection(b).count() as f64 / (a.len() + b.len()) as f64
}

// =============================================================================
// MockModel
// =============================================================================

/// Record of a call made to the mock model.
#[derive(Debug, Clone)]
pub struct MockModelCall {
    pub request: GenerateRequest,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Scripted [`LanguageModel`].
///
/// Replies are keyed by prompt name. Several replies for one prompt are
/// returned in order, and the last one repeats. Unscripted prompts get `{}`.
/// Token counts come from [`TokenCounter`] for the requested model, `gpt-4`
/// when none is given.
#[derive(Clone, Default)]
pub struct MockModel {
    replies: Arc<RwLock<HashMap<String, VecDeque<String>>>>,
    failures: Arc<RwLock<HashSet<String>>>,
    calls: Arc<RwLock<Vec<MockModelCall>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `prompt`.
    pub fn with_reply(self, prompt: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(prompt.into())
            .or_default()
            .push_back(reply.into());
        self
    }

    /// Queue several replies for `prompt`, returned in order.
    pub fn with_replies<I, S>(self, prompt: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        replies
            .into_iter()
            .fold(self, |model, reply| model.with_reply(prompt, reply))
    }

    /// Make every call for `prompt` fail.
    pub fn failing(self, prompt: impl Into<String>) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prompt.into());
        self
    }

    pub fn calls(&self) -> Vec<MockModelCall> {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.request.prompt == prompt)
            .count()
    }

    /// Prompt names in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.request.prompt.clone())
            .collect()
    }

    pub fn total_input_tokens(&self) -> u32 {
        self.calls().iter().map(|c| c.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u32 {
        self.calls().iter().map(|c| c.output_tokens).sum()
    }

    fn next_reply(&self, prompt: &str) -> String {
        let mut replies = self.replies.write().unwrap_or_else(PoisonError::into_inner);
        match replies.get_mut(prompt) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => "{}".to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(&self, request: GenerateRequest) -> Result<Completion, ModelError> {
        let counter = TokenCounter::for_model(request.model.as_deref().unwrap_or(DEFAULT_MODEL))?;
        let failing = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&request.prompt);

        let (reply, input_tokens, output_tokens) = if failing {
            (None, 0, 0)
        } else {
            let reply = self.next_reply(&request.prompt);
            let history = request
                .history
                .iter()
                .map(|t| (t.role.as_str(), t.content.as_str()));
            let input = counter.count_messages(
                std::iter::once(("system", request.system.as_str()))
                    .chain(history)
                    .chain(std::iter::once(("user", request.user.as_str()))),
            );
            let output = counter.count(&reply);
            (Some(reply), input, output)
        };

        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockModelCall {
                request,
                input_tokens,
                output_tokens,
            });

        match reply {
            Some(text) => Ok(Completion::new(text, input_tokens, output_tokens)),
            None => Err(ModelError::Unavailable("scripted failure".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// MemoryIndex
// =============================================================================

/// Record of a call made to the memory index.
#[derive(Debug, Clone, PartialEq)]
pub enum MockIndexCall {
    SearchProducts {
        query: String,
        limit: usize,
        filtered: bool,
        mode: SearchMode,
    },
    SearchRoutes {
        query: String,
    },
    StoreRawData {
        product_id: String,
    },
    GetChunks {
        product_id: String,
        probe: String,
    },
    StoreSearchResult {
        product_id: String,
        source: String,
    },
}

/// In-process [`ProductIndex`].
///
/// Products are scored by the share of query words they contain. Semantic
/// and hybrid searches return every product passing the filter, best first;
/// lexical search drops products with no word in common. Routes are scored
/// by word overlap with their descriptor sentence unless a fixed score is set
/// with [`with_route_score`](Self::with_route_score).
#[derive(Clone)]
pub struct MemoryIndex {
    products: Arc<RwLock<Vec<Product>>>,
    routes: Arc<RwLock<Vec<RouteDescriptor>>>,
    route_scores: Arc<RwLock<IndexMap<Category, f64>>>,
    chunks: Arc<RwLock<HashMap<String, Vec<Chunk>>>>,
    chunking: ChunkConfig,
    failing: bool,
    calls: Arc<RwLock<Vec<MockIndexCall>>>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Empty catalogue with the default route corpus.
    pub fn new() -> Self {
        Self {
            products: Arc::default(),
            routes: Arc::new(RwLock::new(seed_routes())),
            route_scores: Arc::default(),
            chunks: Arc::default(),
            chunking: ChunkConfig::default(),
            failing: false,
            calls: Arc::default(),
        }
    }

    pub fn with_products(self, products: impl IntoIterator<Item = Product>) -> Self {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(products);
        self
    }

    pub fn with_routes(self, routes: Vec<RouteDescriptor>) -> Self {
        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = routes;
        self
    }

    /// Fix the similarity returned for `category`. Once any score is fixed,
    /// only fixed scores are returned.
    pub fn with_route_score(self, category: Category, similarity: f64) -> Self {
        self.route_scores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category, similarity);
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Every call fails with [`IndexError::Query`].
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<MockIndexCall> {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn product_searches(&self) -> Vec<MockIndexCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MockIndexCall::SearchProducts { .. }))
            .collect()
    }

    /// Stored chunks for a product in insertion order.
    pub fn chunks_for(&self, product_id: &str) -> Vec<Chunk> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(product_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: MockIndexCall) -> Result<(), IndexError> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.failing {
            return Err(IndexError::Query("memory index set to fail".into()));
        }
        Ok(())
    }

    fn push_chunk(&self, product_id: &str, chunk: Chunk) {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let stored = chunks.entry(product_id.to_string()).or_default();
        if !stored.contains(&chunk) {
            stored.push(chunk);
        }
    }
}

fn product_text(product: &Product) -> String {
    let mut text = product.name.clone();
    for value in product.attributes().values() {
        text.push(' ');
        text.push_str(&value.as_text());
    }
    text
}

/// Stable sort by score, best first.
fn rank<T>(mut scored: Vec<(T, f64)>) -> Vec<(T, f64)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

#[async_trait]
impl ProductIndex for MemoryIndex {
    async fn search_products(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&Predicate>,
        mode: SearchMode,
    ) -> Result<Vec<ScoredProduct>, IndexError> {
        self.record(MockIndexCall::SearchProducts {
            query: query.to_string(),
            limit,
            filtered: filters.is_some(),
            mode,
        })?;

        let query_words = words(query);
        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        let scored: Vec<(Product, f64)> = products
            .iter()
            .filter(|p| filters.is_none_or(|f| f.matches(p)))
            .map(|p| (p.clone(), coverage(&query_words, &product_text(p))))
            .filter(|(_, score)| mode != SearchMode::Lexical || *score > 0.0)
            .collect();

        Ok(rank(scored)
            .into_iter()
            .take(limit)
            .map(|(product, score)| ScoredProduct::new(product, score))
            .collect())
    }

    async fn search_routes(&self, query: &str) -> Result<Vec<RouteHit>, IndexError> {
        self.record(MockIndexCall::SearchRoutes {
            query: query.to_string(),
        })?;

        let fixed = self.route_scores.read().unwrap_or_else(PoisonError::into_inner);
        let scored: Vec<(Category, f64)> = if fixed.is_empty() {
            let query_words = words(query);
            self.routes
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|r| (r.route, dice(&query_words, &words(&r.description))))
                .filter(|(_, score)| *score > 0.0)
                .collect()
        } else {
            fixed.iter().map(|(c, s)| (*c, *s)).collect()
        };

        Ok(rank(scored)
            .into_iter()
            .take(3)
            .map(|(category, similarity)| RouteHit {
                category,
                similarity,
            })
            .collect())
    }

    async fn store_raw_data(&self, product_id: &str, text: &str) -> Result<usize, IndexError> {
        self.record(MockIndexCall::StoreRawData {
            product_id: product_id.to_string(),
        })?;
        let pieces = chunk_text(text, self.chunking);
        let count = pieces.len();
        for piece in pieces {
            self.push_chunk(
                product_id,
                Chunk {
                    chunk_text: piece,
                    source_type: ChunkSource::RawData,
                },
            );
        }
        Ok(count)
    }

    async fn get_relevant_chunks(
        &self,
        product_id: &str,
        probe: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>, IndexError> {
        self.record(MockIndexCall::GetChunks {
            product_id: product_id.to_string(),
            probe: probe.to_string(),
        })?;
        let probe_words = words(probe);
        let scored: Vec<(Chunk, f64)> = self
            .chunks_for(product_id)
            .into_iter()
            .map(|c| {
                let score = coverage(&probe_words, &c.chunk_text);
                (c, score)
            })
            .collect();
        Ok(rank(scored).into_iter().take(limit).map(|(c, _)| c).collect())
    }

    async fn store_search_results(
        &self,
        product_id: &str,
        _query: &str,
        content: &str,
        source: &str,
    ) -> Result<(), IndexError> {
        self.record(MockIndexCall::StoreSearchResult {
            product_id: product_id.to_string(),
            source: source.to_string(),
        })?;
        self.push_chunk(
            product_id,
            Chunk {
                chunk_text: content.to_string(),
                source_type: ChunkSource::SearchResult,
            },
        );
        Ok(())
    }
}

// =============================================================================
// MockWebSearcher
// =============================================================================

/// Record of a call made to the mock web searcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSearchCall {
    pub query: String,
    pub exclude_domains: Vec<String>,
}

/// Scripted [`WebSearcher`]. Every search returns the registered hits whose
/// domain is not excluded, so a source is only ever served once per loop.
#[derive(Clone, Default)]
pub struct MockWebSearcher {
    hits: Arc<RwLock<Vec<WebSearchHit>>>,
    failing: bool,
    calls: Arc<RwLock<Vec<MockSearchCall>>>,
}

impl MockWebSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. `search_query` on the returned hit is the live query.
    pub fn with_page(self, content: impl Into<String>, source: impl Into<String>) -> Self {
        self.hits
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WebSearchHit::new("", content, source));
        self
    }

    /// Every call fails with [`SearchError::Disabled`].
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<MockSearchCall> {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl WebSearcher for MockWebSearcher {
    async fn search(
        &self,
        query: &str,
        exclude_domains: &[String],
    ) -> Result<Vec<WebSearchHit>, SearchError> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockSearchCall {
                query: query.to_string(),
                exclude_domains: exclude_domains.to_vec(),
            });
        if self.failing {
            return Err(SearchError::Disabled);
        }

        Ok(self
            .hits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|hit| !exclude_domains.contains(&hit.domain()))
            .map(|hit| WebSearchHit::new(query, &hit.search_result, &hit.data_source))
            .collect())
    }
}
