//! Per-run state for the feature extraction graph.

use std::time::Duration;

use flowgraph::{Append, Counter, GraphState, NodeError, Overwrite, Reducer, Telemetry, UsageRow};

use super::merge::FeatureMap;
use crate::types::Attribute;

/// State carried through one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractorState {
    pub raw_data: Overwrite<String>,
    pub product_id: Overwrite<String>,
    pub extracted_features: FeatureMap,
    /// Attributes each missing-feature search targeted, in order.
    pub missing_features: Append<Attribute>,
    pub low_confidence_features: Append<Attribute>,
    pub missing_feature_attempts: Counter,
    pub low_confidence_attempts: Counter,
    /// Web domains already consulted.
    pub exclude_domains: Append<String>,
    /// Set when a fill round left the record unchanged.
    pub missing_stalled: Overwrite<bool>,
    /// Set when a refine round left the record unchanged.
    pub low_confidence_stalled: Overwrite<bool>,
    pub usage_data: Telemetry,
}

impl ExtractorState {
    pub fn new(product_id: impl Into<String>, raw_data: impl Into<String>) -> Self {
        Self {
            product_id: Overwrite::new(product_id.into()),
            raw_data: Overwrite::new(raw_data.into()),
            ..Default::default()
        }
    }

    pub fn product_id(&self) -> &str {
        self.product_id.get().map(String::as_str).unwrap_or_default()
    }

    pub fn raw_data(&self) -> &str {
        self.raw_data.get().map(String::as_str).unwrap_or_default()
    }

    pub fn exclude_domains(&self) -> Vec<String> {
        self.exclude_domains.as_slice().to_vec()
    }

    pub fn is_missing_stalled(&self) -> bool {
        self.missing_stalled.get().copied().unwrap_or(false)
    }

    pub fn is_low_confidence_stalled(&self) -> bool {
        self.low_confidence_stalled.get().copied().unwrap_or(false)
    }
}

impl GraphState for ExtractorState {
    fn merge(&mut self, delta: Self) {
        self.raw_data.reduce(delta.raw_data);
        self.product_id.reduce(delta.product_id);
        self.extracted_features.reduce(delta.extracted_features);
        self.missing_features.reduce(delta.missing_features);
        self.low_confidence_features.reduce(delta.low_confidence_features);
        self.missing_feature_attempts.reduce(delta.missing_feature_attempts);
        self.low_confidence_attempts.reduce(delta.low_confidence_attempts);
        self.exclude_domains.reduce(delta.exclude_domains);
        self.missing_stalled.reduce(delta.missing_stalled);
        self.low_confidence_stalled.reduce(delta.low_confidence_stalled);
        self.usage_data.reduce(delta.usage_data);
    }

    fn failure_delta(node: &str, error: &NodeError, elapsed: Duration) -> Self {
        Self {
            usage_data: Telemetry::row(node, UsageRow::failed(error.to_string(), elapsed.as_secs_f64())),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ExtractedFeature;

    #[test]
    fn test_counters_never_move_backwards() {
        let mut state = ExtractorState::new("p1", "text");
        state.merge(ExtractorState {
            missing_feature_attempts: Counter::new(2),
            ..Default::default()
        });
        state.merge(ExtractorState {
            missing_feature_attempts: Counter::new(1),
            ..Default::default()
        });
        assert_eq!(state.missing_feature_attempts.get(), 2);
    }

    #[test]
    fn test_exclusions_and_features_accumulate() {
        let mut state = ExtractorState::new("p1", "text");
        let mut features = FeatureMap::new();
        features.insert(Attribute::Name, ExtractedFeature::new(Attribute::Name, "BOARD".into(), 0.9));
        state.merge(ExtractorState {
            extracted_features: features,
            exclude_domains: Append::one("congatec.com".to_string()),
            ..Default::default()
        });
        state.merge(ExtractorState {
            exclude_domains: Append::one("kontron.com".to_string()),
            ..Default::default()
        });

        assert_eq!(state.exclude_domains(), vec!["congatec.com", "kontron.com"]);
        assert_eq!(state.extracted_features.text(Attribute::Name).as_deref(), Some("BOARD"));
        assert_eq!(state.product_id(), "p1");
    }

    #[test]
    fn test_failure_delta_records_zero_tokens() {
        let mut state = ExtractorState::new("p1", "text");
        let error = NodeError::msg("index down");
        state.merge(ExtractorState::failure_delta("store_and_chunk", &error, Duration::from_millis(3)));
        let rows = state.usage_data.rows("store_and_chunk");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].input_tokens, 0);
        assert_eq!(rows[0].error.as_deref(), Some("index down"));
    }
}
