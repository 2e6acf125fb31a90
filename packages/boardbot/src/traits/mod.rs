//! Collaborator abstractions.
//!
//! The pipelines depend only on these traits; applications pick the
//! implementations (OpenAI, Weaviate, Tavily, or the in-memory doubles in
//! [`crate::testing`]).

pub mod index;
pub mod model;
pub mod searcher;

pub use index::{Chunk, ChunkSource, ProductIndex, RouteHit, ScoredProduct, SearchMode};
pub use model::{ChatTurn, Completion, GenerateRequest, LanguageModel, Role};
pub use searcher::{source_domain, DisabledWebSearcher, WebSearchHit, WebSearcher};
