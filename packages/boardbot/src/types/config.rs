//! Typed configuration for the pipelines and collaborators.
//!
//! Environment loading lives in the binary; these structs only carry values
//! and defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Completion parameters applied when a call doesn't override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub seed: Option<u64>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_tokens: 2400,
            temperature: 0.0,
            top_p: 1.0,
            seed: Some(1729),
        }
    }
}

impl ModelSettings {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Per-collaborator deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub llm: Duration,
    pub index: Duration,
    pub web_search: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            llm: Duration::from_secs(30),
            index: Duration::from_secs(10),
            web_search: Duration::from_secs(15),
        }
    }
}

/// Route classifier realisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouterKind {
    Llm,
    Semantic,
    #[default]
    Hybrid,
}

impl RouterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RouterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouterKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" | "llm_router" => Ok(Self::Llm),
            "semantic" | "semantic_router" => Ok(Self::Semantic),
            "hybrid" | "hybrid_router" => Ok(Self::Hybrid),
            _ => Err(ValidationError::UnknownRouter(s.to_string())),
        }
    }
}

/// Feature extractor realisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Agentic,
    Simple,
}

impl FromStr for ExtractorKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agentic" => Ok(Self::Agentic),
            "simple" => Ok(Self::Simple),
            _ => Err(ValidationError::UnknownExtractor(s.to_string())),
        }
    }
}

/// Query orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Below this classification confidence the user is asked to clarify.
    pub classification_threshold: f64,
    /// Below this semantic-router confidence the hybrid router asks the model.
    pub hybrid_fallback_threshold: f64,
    pub default_product_count: usize,
    pub query_expansions: usize,
    /// Candidates shown to the reranker.
    pub rerank_top_k: usize,
    pub router_kind: RouterKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classification_threshold: 50.0,
            hybrid_fallback_threshold: 70.0,
            default_product_count: 5,
            query_expansions: 3,
            rerank_top_k: 10,
            router_kind: RouterKind::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_router(mut self, router_kind: RouterKind) -> Self {
        self.router_kind = router_kind;
        self
    }

    pub fn with_default_product_count(mut self, count: usize) -> Self {
        self.default_product_count = count;
        self
    }

    pub fn with_query_expansions(mut self, expansions: usize) -> Self {
        self.query_expansions = expansions;
        self
    }
}

/// Feature extraction settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub model: String,
    pub max_missing_attempts: u32,
    pub max_low_confidence_attempts: u32,
    /// Features below this confidence are refined and left out of the result.
    pub confidence_threshold: f64,
    /// Chunks retrieved per extraction prompt.
    pub chunk_limit: usize,
    pub extractor_kind: ExtractorKind,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_missing_attempts: 2,
            max_low_confidence_attempts: 2,
            confidence_threshold: 0.7,
            chunk_limit: 7,
            extractor_kind: ExtractorKind::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_missing_attempts(mut self, attempts: u32) -> Self {
        self.max_missing_attempts = attempts;
        self
    }

    pub fn with_max_low_confidence_attempts(mut self, attempts: u32) -> Self {
        self.max_low_confidence_attempts = attempts;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }

    pub fn with_extractor(mut self, kind: ExtractorKind) -> Self {
        self.extractor_kind = kind;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ModelSettings::default();
        assert_eq!(settings.model, "gpt-4");
        assert_eq!(settings.max_tokens, 2400);
        assert_eq!(settings.seed, Some(1729));

        let timeouts = Timeouts::default();
        assert_eq!(timeouts.llm, Duration::from_secs(30));
        assert_eq!(timeouts.index, Duration::from_secs(10));
        assert_eq!(timeouts.web_search, Duration::from_secs(15));

        let extraction = ExtractionConfig::default();
        assert_eq!(extraction.max_missing_attempts, 2);
        assert_eq!(extraction.max_low_confidence_attempts, 2);
        assert_eq!(extraction.confidence_threshold, 0.7);
    }

    #[test]
    fn test_router_kind_parsing() {
        assert_eq!("Hybrid".parse::<RouterKind>().unwrap(), RouterKind::Hybrid);
        assert_eq!("llm_router".parse::<RouterKind>().unwrap(), RouterKind::Llm);
        assert_eq!(
            "neural".parse::<RouterKind>(),
            Err(ValidationError::UnknownRouter("neural".into()))
        );
        assert!("fancy".parse::<ExtractorKind>().is_err());
    }
}
