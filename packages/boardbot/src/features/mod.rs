//! Feature extraction: turn raw vendor text into a confidence-scored
//! attribute record.
//!
//! Two realisations share [`FeatureExtraction`]:
//!
//! - [`FeatureExtractor`] - graph-driven loop that stores and chunks the text,
//!   extracts once, then searches the web for missing and low-confidence
//!   attributes within bounded attempt budgets
//! - [`SimpleFeatureExtractor`] - one model call over the raw text
//!
//! Both report only values at or above the configured confidence threshold.

pub mod agentic;
pub mod merge;
pub mod query;
pub mod simple;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use flowgraph::Telemetry;
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Result;
use crate::services::Services;
use crate::types::{ExtractionConfig, ExtractorKind, FeatureValue};

pub use agentic::{build_extraction_graph, next_step, ExtractionContext, FeatureExtractor};
pub use merge::{ExtractedFeature, FeatureMap};
pub use query::{construct_search_query, MAX_QUERY_CHARS};
pub use simple::SimpleFeatureExtractor;
pub use state::ExtractorState;

/// Outcome of one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Attribute values at or above the confidence threshold.
    pub extracted_data: IndexMap<String, FeatureValue>,
    /// Per-node usage rows.
    pub usage: Telemetry,
    /// Full record including low-confidence values.
    #[serde(skip)]
    pub features: FeatureMap,
}

/// Raw text in, confidence-filtered attribute record out.
#[async_trait]
pub trait FeatureExtraction: Send + Sync {
    async fn extract(&self, text: &str, product_id: &str) -> Result<ExtractionResult>;

    fn kind(&self) -> ExtractorKind;
}

/// Extractor selected by `config.extractor_kind`.
pub fn extractor_for(
    services: Services,
    config: ExtractionConfig,
) -> Result<Arc<dyn FeatureExtraction>> {
    let extractor: Arc<dyn FeatureExtraction> = match config.extractor_kind {
        ExtractorKind::Agentic => Arc::new(FeatureExtractor::new(services, config)?),
        ExtractorKind::Simple => Arc::new(SimpleFeatureExtractor::new(services, config)),
    };
    Ok(extractor)
}
