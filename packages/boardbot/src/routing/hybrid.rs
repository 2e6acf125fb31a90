//! Semantic classification with a model fallback.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{LlmRouter, RouteClassifier, RouteDecision, SemanticRouter};
use crate::error::Result;
use crate::services::Services;
use crate::traits::ChatTurn;
use crate::types::RouterKind;

/// Default confidence below which the model is consulted.
pub const DEFAULT_FALLBACK_THRESHOLD: f64 = 70.0;

/// Tries [`SemanticRouter`] first and defers to [`LlmRouter`] when the
/// semantic confidence is under the threshold or the index is unreachable.
#[derive(Debug, Clone, Copy)]
pub struct HybridRouter {
    semantic: SemanticRouter,
    llm: LlmRouter,
    fallback_threshold: f64,
}

impl Default for HybridRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridRouter {
    pub fn new() -> Self {
        Self {
            semantic: SemanticRouter::new(),
            llm: LlmRouter::new(),
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }

    pub fn with_fallback_threshold(mut self, threshold: f64) -> Self {
        self.fallback_threshold = threshold;
        self
    }
}

#[async_trait]
impl RouteClassifier for HybridRouter {
    async fn classify(
        &self,
        services: &Services,
        query: &str,
        history: &[ChatTurn],
        model: Option<&str>,
    ) -> Result<RouteDecision> {
        match self.semantic.classify(services, query, history, model).await {
            Ok(decision) if decision.classification.confidence >= self.fallback_threshold => {
                return Ok(decision);
            }
            Ok(decision) => info!(
                confidence = decision.classification.confidence,
                threshold = self.fallback_threshold,
                "semantic route unsure, asking model"
            ),
            Err(error) => warn!(error = %error, "semantic route failed, asking model"),
        }
        self.llm.classify(services, query, history, model).await
    }

    fn kind(&self) -> RouterKind {
        RouterKind::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_services_with_index, MemoryIndex, MockModel};
    use crate::types::Category;

    const LLM_REPLY: &str =
        r#"{"category": "clear_intent_product", "confidence": 88, "justification": "specs"}"#;

    #[tokio::test]
    async fn test_confident_semantic_hit_skips_model() {
        let index = MemoryIndex::new().with_route_score(Category::Politics, 0.95);
        let model = MockModel::new().with_reply("route_classification", LLM_REPLY);
        let services = test_services_with_index(model.clone(), index);

        let decision = HybridRouter::new().classify(&services, "election", &[], None).await.unwrap();

        assert_eq!(decision.classification.category, Category::Politics);
        assert_eq!(decision.classification.justification, "Determined by semantic search");
        assert_eq!(model.calls_for("route_classification"), 0);
    }

    #[tokio::test]
    async fn test_weak_semantic_hit_falls_back() {
        let index = MemoryIndex::new().with_route_score(Category::Chitchat, 0.5);
        let model = MockModel::new().with_reply("route_classification", LLM_REPLY);
        let services = test_services_with_index(model.clone(), index);

        let decision = HybridRouter::new().classify(&services, "8GB board", &[], None).await.unwrap();

        assert_eq!(decision.classification.category, Category::ClearIntentProduct);
        assert_eq!(model.calls_for("route_classification"), 1);
    }
}
