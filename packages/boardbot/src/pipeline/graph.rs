//! Wiring of the query orchestration graph.

use flowgraph::{CompiledGraph, ErrorPolicy, GraphBuilder, GraphError, END};

use super::nodes::{
    self, CHITCHAT, CLASSIFY, COMPOSE_ANSWER, COMPOSE_OVERVIEW, DECOMPOSE, GENERATE_QUERY,
    LOW_CONFIDENCE, REFUSE, RERANK, RETRIEVE, RETRIEVE_OVERVIEW,
};
use super::state::RequestState;
use super::PipelineContext;
use crate::types::{Category, PipelineConfig};

/// Router label for messages below the classification threshold.
const UNSURE: &str = "unsure";

/// Build the orchestration graph.
///
/// ```text
/// classify ─┬─ unsure ──────────────── low_confidence ─ END
///           ├─ politics/do_not_respond ─ refuse ─────── END
///           ├─ chitchat ─────────────── chitchat ────── END
///           ├─ vague ─ generate_query ─ retrieve_overview ─ compose_overview ─ END
///           └─ clear ─ decompose ─ retrieve ─ rerank ─ compose_answer ─ END
/// ```
///
/// A failing classifier goes to `low_confidence`. Failing composers abort
/// the run with an error envelope; every other node falls through.
pub fn build_graph(
    config: &PipelineConfig,
) -> Result<CompiledGraph<RequestState, PipelineContext>, GraphError> {
    let threshold = config.classification_threshold;
    let route = move |state: &RequestState| -> &'static str {
        match state.classification.get() {
            Some(c) if c.confidence >= threshold => c.category.as_str(),
            _ => UNSURE,
        }
    };

    GraphBuilder::new()
        .add_node(CLASSIFY, nodes::classify)
        .add_node(REFUSE, nodes::refuse)
        .add_node(CHITCHAT, nodes::chitchat)
        .add_node(LOW_CONFIDENCE, nodes::low_confidence)
        .add_node(GENERATE_QUERY, nodes::generate_query)
        .add_node(RETRIEVE_OVERVIEW, nodes::retrieve_overview)
        .add_node(COMPOSE_OVERVIEW, nodes::compose_overview)
        .add_node(DECOMPOSE, nodes::decompose)
        .add_node(RETRIEVE, nodes::retrieve)
        .add_node(RERANK, nodes::rerank)
        .add_node(COMPOSE_ANSWER, nodes::compose_answer)
        .set_entry(CLASSIFY)
        .add_conditional_edges(
            CLASSIFY,
            route,
            [
                (UNSURE, LOW_CONFIDENCE),
                (Category::Politics.as_str(), REFUSE),
                (Category::DoNotRespond.as_str(), REFUSE),
                (Category::Chitchat.as_str(), CHITCHAT),
                (Category::VagueIntentProduct.as_str(), GENERATE_QUERY),
                (Category::ClearIntentProduct.as_str(), DECOMPOSE),
            ],
        )
        .add_edge(GENERATE_QUERY, RETRIEVE_OVERVIEW)
        .add_edge(RETRIEVE_OVERVIEW, COMPOSE_OVERVIEW)
        .add_edge(DECOMPOSE, RETRIEVE)
        .add_edge(RETRIEVE, RERANK)
        .add_edge(RERANK, COMPOSE_ANSWER)
        .add_edge(REFUSE, END)
        .add_edge(CHITCHAT, END)
        .add_edge(LOW_CONFIDENCE, END)
        .add_edge(COMPOSE_OVERVIEW, END)
        .add_edge(COMPOSE_ANSWER, END)
        .on_error(CLASSIFY, ErrorPolicy::Goto(LOW_CONFIDENCE.to_string()))
        .on_error(GENERATE_QUERY, ErrorPolicy::Continue)
        .on_error(RETRIEVE_OVERVIEW, ErrorPolicy::Continue)
        .on_error(DECOMPOSE, ErrorPolicy::Continue)
        .on_error(RETRIEVE, ErrorPolicy::Continue)
        .on_error(RERANK, ErrorPolicy::Continue)
        .compile()
}
