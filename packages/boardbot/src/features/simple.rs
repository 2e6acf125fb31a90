//! Single-pass extraction over the raw text, without the index or the web.

use std::time::Instant;

use async_trait::async_trait;
use flowgraph::{Telemetry, UsageRow};
use tracing::info;

use super::merge::FeatureMap;
use super::{ExtractionResult, FeatureExtraction};
use crate::ai::parse_object;
use crate::error::{Result, ValidationError};
use crate::services::Services;
use crate::types::{Attribute, ExtractionConfig, ExtractorKind};

pub const SIMPLE_EXTRACT: &str = "simple_extract";

const SIMPLE_MAX_TOKENS: u32 = 4096;

/// Bare values in the reply are taken at full confidence.
const BARE_VALUE_CONFIDENCE: f64 = 1.0;

pub struct SimpleFeatureExtractor {
    services: Services,
    config: ExtractionConfig,
}

impl SimpleFeatureExtractor {
    pub fn new(services: Services, config: ExtractionConfig) -> Self {
        Self { services, config }
    }
}

#[async_trait]
impl FeatureExtraction for SimpleFeatureExtractor {
    async fn extract(&self, text: &str, product_id: &str) -> Result<ExtractionResult> {
        if product_id.trim().is_empty() {
            return Err(ValidationError::EmptyProductId.into());
        }
        let started = Instant::now();
        let attributes = Attribute::describe(&Attribute::ALL);
        let prompt = self.services.prompt(
            "simple_data_extraction",
            &[("raw_data", text), ("attribute_descriptions", &attributes)],
        )?;
        let model = self.config.model.clone();
        let completion = self
            .services
            .complete(prompt, &[], |request| {
                request.with_model(model).with_max_tokens(SIMPLE_MAX_TOKENS)
            })
            .await?;

        let features =
            FeatureMap::from_reply(&parse_object(&completion.text), BARE_VALUE_CONFIDENCE);
        let extracted_data = features.confident(self.config.confidence_threshold);
        info!(
            product_id,
            extracted = extracted_data.len(),
            "simple extraction finished"
        );

        Ok(ExtractionResult {
            extracted_data,
            usage: Telemetry::row(
                SIMPLE_EXTRACT,
                UsageRow::new(
                    completion.input_tokens,
                    completion.output_tokens,
                    started.elapsed().as_secs_f64(),
                ),
            ),
            features,
        })
    }

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Simple
    }
}
