//! Per-request state for the query orchestration graph.

use std::time::Duration;

use flowgraph::{Append, GraphState, NodeError, Overwrite, Reducer, Telemetry, UsageRow};
use indexmap::IndexMap;

use crate::envelope::ResponseEnvelope;
use crate::traits::{ChatTurn, ScoredProduct};
use crate::types::{Classification, FilterValue, QueryContext};

/// State carried through one orchestration run. Every field is a reducer;
/// nodes return deltas built from `Default`.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    pub model_name: Overwrite<String>,
    pub chat_history: Overwrite<Vec<ChatTurn>>,
    pub current_message: Overwrite<String>,
    pub classification: Overwrite<Classification>,
    pub query_context: Overwrite<QueryContext>,
    pub filters: Overwrite<IndexMap<String, FilterValue>>,
    /// Rewritten query on the vague path.
    pub semantic_query: Overwrite<String>,
    /// First element is the original message.
    pub expanded_queries: Overwrite<Vec<String>>,
    pub search_results: Append<ScoredProduct>,
    /// The reranker's reply, restricted to known candidates.
    pub reranking: Overwrite<serde_json::Value>,
    pub final_results: Overwrite<Vec<ScoredProduct>>,
    pub output: Overwrite<ResponseEnvelope>,
    pub telemetry: Telemetry,
}

impl RequestState {
    pub fn new(message: impl Into<String>, history: Vec<ChatTurn>) -> Self {
        Self {
            current_message: Overwrite::new(message.into()),
            chat_history: Overwrite::new(history),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Overwrite::new(model.into());
        self
    }

    pub fn message(&self) -> &str {
        self.current_message.get().map(String::as_str).unwrap_or_default()
    }

    pub fn history(&self) -> &[ChatTurn] {
        self.chat_history.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn model(&self) -> Option<String> {
        self.model_name.get().cloned()
    }

    pub fn context(&self) -> QueryContext {
        self.query_context.get().cloned().unwrap_or_default()
    }

    pub fn filter_map(&self) -> IndexMap<String, FilterValue> {
        self.filters.get().cloned().unwrap_or_default()
    }

    /// Delta holding only a telemetry row.
    pub fn usage(stage: &str, row: UsageRow) -> Self {
        Self {
            telemetry: Telemetry::row(stage, row),
            ..Default::default()
        }
    }
}

impl GraphState for RequestState {
    fn merge(&mut self, delta: Self) {
        self.model_name.reduce(delta.model_name);
        self.chat_history.reduce(delta.chat_history);
        self.current_message.reduce(delta.current_message);
        self.classification.reduce(delta.classification);
        self.query_context.reduce(delta.query_context);
        self.filters.reduce(delta.filters);
        self.semantic_query.reduce(delta.semantic_query);
        self.expanded_queries.reduce(delta.expanded_queries);
        self.search_results.reduce(delta.search_results);
        self.reranking.reduce(delta.reranking);
        self.final_results.reduce(delta.final_results);
        self.output.reduce(delta.output);
        self.telemetry.reduce(delta.telemetry);
    }

    fn failure_delta(node: &str, error: &NodeError, elapsed: Duration) -> Self {
        Self::usage(node, UsageRow::failed(error.to_string(), elapsed.as_secs_f64()))
    }

    fn abort_delta(_node: &str, error: &NodeError) -> Self {
        Self {
            output: Overwrite::new(ResponseEnvelope::error(error.to_string())),
            ..Default::default()
        }
    }
}
