//! Route classifiers.
//!
//! Three interchangeable realisations share the [`RouteClassifier`] contract:
//! the model reads the message ([`LlmRouter`]), the index matches it against
//! per-category descriptor sentences ([`SemanticRouter`]), or the index is
//! tried first and the model consulted when it is unsure ([`HybridRouter`]).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::services::Services;
use crate::traits::ChatTurn;
use crate::types::{Classification, PipelineConfig, RouterKind};

pub mod hybrid;
pub mod llm;
pub mod semantic;

pub use hybrid::HybridRouter;
pub use llm::LlmRouter;
pub use semantic::SemanticRouter;

/// A classification plus the model tokens spent producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub classification: Classification,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl RouteDecision {
    /// Decision that used no model tokens.
    pub fn free(classification: Classification) -> Self {
        Self {
            classification,
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// Decides which category a message belongs to. `model` overrides the
/// configured model for classifiers that call one.
#[async_trait]
pub trait RouteClassifier: Send + Sync {
    async fn classify(
        &self,
        services: &Services,
        query: &str,
        history: &[ChatTurn],
        model: Option<&str>,
    ) -> Result<RouteDecision>;

    fn kind(&self) -> RouterKind;
}

/// Build the classifier selected by `config.router_kind`.
pub fn classifier_for(config: &PipelineConfig) -> Arc<dyn RouteClassifier> {
    match config.router_kind {
        RouterKind::Llm => Arc::new(LlmRouter::new()),
        RouterKind::Semantic => Arc::new(SemanticRouter::new()),
        RouterKind::Hybrid => {
            Arc::new(HybridRouter::new().with_fallback_threshold(config.hybrid_fallback_threshold))
        }
    }
}
