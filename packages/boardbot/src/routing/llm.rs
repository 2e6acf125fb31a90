//! Model-backed classification.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{RouteClassifier, RouteDecision};
use crate::ai::parse_object;
use crate::error::Result;
use crate::services::Services;
use crate::traits::ChatTurn;
use crate::types::{Category, Classification, RouterKind};

/// Asks the model to pick a category using the `route_classification` prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct LlmRouter;

impl LlmRouter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RouteClassifier for LlmRouter {
    async fn classify(
        &self,
        services: &Services,
        query: &str,
        history: &[ChatTurn],
        model: Option<&str>,
    ) -> Result<RouteDecision> {
        let prompt = services.prompt("route_classification", &[("query", query)])?;
        let completion = services
            .complete(prompt, history, |request| match model {
                Some(model) => request.with_model(model),
                None => request,
            })
            .await?;

        let reply = parse_object(&completion.text);
        let classification = Classification::from_json(&reply).unwrap_or_else(|| {
            warn!("classification reply had no usable category");
            // zero confidence sends the request to the clarification composer
            Classification::new(Category::VagueIntentProduct, 0.0, "Unparseable classification")
        });
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            "llm classification"
        );

        Ok(RouteDecision {
            classification,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }

    fn kind(&self) -> RouterKind {
        RouterKind::Llm
    }
}
