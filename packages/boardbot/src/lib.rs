//! Hardware Product-Search Assistant
//!
//! Two cores built on the `flowgraph` executor:
//!
//! - **Query orchestration** - classify a chat message, then answer it along
//!   the path its category selects (refusal, chitchat, clarification, an
//!   overview of loosely matching boards, or a filtered and reranked
//!   shortlist). Every path ends in a [`ResponseEnvelope`].
//! - **Feature extraction** - turn raw vendor text into a confidence-scored
//!   attribute record, filling gaps from the open web within bounded budgets.
//!
//! # Usage
//!
//! ```rust,ignore
//! use boardbot::{Assistant, PipelineConfig, UserMessage};
//! use boardbot::testing::{test_services, MockModel};
//!
//! let services = test_services(MockModel::new());
//! let assistant = Assistant::new(services, PipelineConfig::default())?;
//!
//! let envelope = assistant
//!     .respond(UserMessage::new("Find COM Express modules with at least 16GB DDR4"))
//!     .await;
//! println!("{}", envelope.to_json());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (model, index, web search)
//! - [`types`] - Catalogue schema, routes, query context, configuration
//! - [`prompts`] - Named prompt catalogue with variable validation
//! - [`filters`] - High-level filter clauses to index predicates
//! - [`routing`] - LLM, semantic and hybrid route classifiers
//! - [`pipeline`] - Query orchestration graph and request boundary
//! - [`features`] - Agentic and single-pass feature extraction
//! - [`ai`], [`index`], [`searchers`] - OpenAI, Weaviate and Tavily adapters
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod envelope;
pub mod error;
pub mod features;
pub mod filters;
pub mod index;
pub mod pipeline;
pub mod prompts;
pub mod routing;
pub mod searchers;
pub mod security;
pub mod services;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use envelope::{EnvelopeKind, EnvelopeMetadata, ProductRef, ResponseEnvelope};
pub use error::{
    BoardbotError, FilterError, IndexError, ModelError, PromptError, Result, SearchError,
    ValidationError,
};
pub use services::Services;
pub use traits::{
    ChatTurn, Chunk, Completion, GenerateRequest, LanguageModel, ProductIndex, RouteHit, Role,
    ScoredProduct, SearchMode, WebSearchHit, WebSearcher,
};
pub use types::{
    Attribute, Category, Classification, ExtractionConfig, ExtractorKind, FeatureValue,
    FilterValue, ModelSettings, PipelineConfig, Product, QueryContext, RouterKind, Timeouts,
    ValueType,
};

// Re-export the two cores
pub use features::{
    extractor_for, ExtractedFeature, ExtractionResult, FeatureExtraction, FeatureExtractor,
    FeatureMap, SimpleFeatureExtractor,
};
pub use pipeline::{Assistant, AssistantReply, UserMessage};

// Re-export adapters
pub use ai::OpenAIModel;
pub use index::{Predicate, WeaviateIndex};
pub use prompts::{PromptCatalogue, RenderedPrompt};
pub use routing::{classifier_for, HybridRouter, LlmRouter, RouteClassifier, SemanticRouter};
pub use searchers::TavilyWebSearcher;
pub use security::SecretString;
