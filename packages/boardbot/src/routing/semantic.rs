//! Index-backed classification against route descriptor sentences.

use async_trait::async_trait;
use tracing::debug;

use super::{RouteClassifier, RouteDecision};
use crate::error::Result;
use crate::services::Services;
use crate::traits::{ChatTurn, RouteHit};
use crate::types::{Category, Classification, RouterKind};

/// Similarities closer than this are treated as equal.
const TIE_TOLERANCE: f64 = 1e-6;

/// Picks the category of the most similar descriptor sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticRouter;

impl SemanticRouter {
    pub fn new() -> Self {
        Self
    }
}

/// Highest similarity wins; near-ties go to the more specific category.
pub fn best_hit(hits: &[RouteHit]) -> Option<&RouteHit> {
    hits.iter().reduce(|best, hit| {
        let delta = hit.similarity - best.similarity;
        let better = delta > TIE_TOLERANCE
            || (delta.abs() <= TIE_TOLERANCE
                && hit.category.specificity_rank() < best.category.specificity_rank());
        if better {
            hit
        } else {
            best
        }
    })
}

#[async_trait]
impl RouteClassifier for SemanticRouter {
    async fn classify(
        &self,
        services: &Services,
        query: &str,
        _history: &[ChatTurn],
        _model: Option<&str>,
    ) -> Result<RouteDecision> {
        let hits = services.search_routes(query).await?;
        let classification = match best_hit(&hits) {
            Some(hit) => Classification::new(
                hit.category,
                hit.similarity * 100.0,
                "Determined by semantic search",
            ),
            None => Classification::new(Category::VagueIntentProduct, 0.0, "No route descriptors matched"),
        };
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            hits = hits.len(),
            "semantic classification"
        );
        Ok(RouteDecision::free(classification))
    }

    fn kind(&self) -> RouterKind {
        RouterKind::Semantic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(category: Category, similarity: f64) -> RouteHit {
        RouteHit {
            category,
            similarity,
        }
    }

    #[test]
    fn test_highest_similarity_wins() {
        let hits = [hit(Category::Chitchat, 0.4), hit(Category::Politics, 0.9)];
        assert_eq!(best_hit(&hits).map(|h| h.category), Some(Category::Politics));
    }

    #[test]
    fn test_ties_prefer_specific_category() {
        let hits = [
            hit(Category::DoNotRespond, 0.8),
            hit(Category::Chitchat, 0.8 + 1e-9),
            hit(Category::VagueIntentProduct, 0.8),
        ];
        assert_eq!(best_hit(&hits).map(|h| h.category), Some(Category::VagueIntentProduct));
        assert!(best_hit(&[]).is_none());
    }
}
