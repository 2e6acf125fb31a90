//! Node bodies for the query orchestration graph.
//!
//! Each node reads a snapshot of [`RequestState`] and returns a delta holding
//! the keys it produced plus one telemetry row under its own name. Index
//! failures are recovered here as empty candidate lists; model failures are
//! returned as errors and handled by the node's error policy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use flowgraph::{Append, NodeError, Overwrite, Telemetry, UsageRow};
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::state::RequestState;
use super::PipelineContext;
use crate::ai::{parse_object, str_field};
use crate::envelope::{EnvelopeKind, ResponseEnvelope};
use crate::error::IndexError;
use crate::filters::build_predicate_lossy;
use crate::traits::{Completion, GenerateRequest, ScoredProduct, SearchMode};
use crate::types::{Attribute, Category, QueryContext};

pub const CLASSIFY: &str = "classify";
pub const REFUSE: &str = "refuse";
pub const CHITCHAT: &str = "chitchat";
pub const LOW_CONFIDENCE: &str = "low_confidence";
pub const GENERATE_QUERY: &str = "generate_query";
pub const RETRIEVE_OVERVIEW: &str = "retrieve_overview";
pub const COMPOSE_OVERVIEW: &str = "compose_overview";
pub const DECOMPOSE: &str = "decompose";
pub const RETRIEVE: &str = "retrieve";
pub const RERANK: &str = "rerank";
pub const COMPOSE_ANSWER: &str = "compose_answer";

const CLARIFY_FOLLOW_UP: &str =
    "Could you tell me a bit more about what you're looking for, such as the kind of hardware or the specifications you need?";

type NodeResult = Result<RequestState, NodeError>;

fn with_request_model(model: Option<String>) -> impl FnOnce(GenerateRequest) -> GenerateRequest {
    move |request| match model {
        Some(model) => request.with_model(model),
        None => request,
    }
}

fn row(started: Instant, completion: &Completion) -> UsageRow {
    UsageRow::new(
        completion.input_tokens,
        completion.output_tokens,
        started.elapsed().as_secs_f64(),
    )
}

fn no_tokens(started: Instant) -> UsageRow {
    UsageRow::new(0, 0, started.elapsed().as_secs_f64())
}

fn product_count(state: &RequestState, ctx: &PipelineContext) -> usize {
    state
        .query_context
        .get()
        .map(|c| c.num_products_requested)
        .unwrap_or(ctx.config.default_product_count)
        .max(1)
}

/// Candidate list as shown to the model.
fn products_json(products: &[ScoredProduct]) -> String {
    Value::Array(products.iter().map(|p| p.product.prompt_view(false)).collect()).to_string()
}

/// Concatenated results deduplicated by product id, first occurrence wins.
pub fn union_by_id(results: impl IntoIterator<Item = ScoredProduct>) -> Vec<ScoredProduct> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|p| seen.insert(p.id().to_string()))
        .collect()
}

fn recover(result: Result<Vec<ScoredProduct>, IndexError>, search: &str) -> Vec<ScoredProduct> {
    result.unwrap_or_else(|error| {
        warn!(search, error = %error, "product search failed, continuing without results");
        Vec::new()
    })
}

/// Envelope from a composer reply. A reply without a `message` field is used
/// verbatim as the message.
fn envelope_from(kind: EnvelopeKind, completion: &Completion) -> ResponseEnvelope {
    let reply = parse_object(&completion.text);
    let mut envelope = ResponseEnvelope::from_reply(kind, &reply);
    if envelope.message.is_empty() {
        envelope.message = completion.text.trim().to_string();
    }
    envelope
}

/// Product ids for an overview: the model's picks that are real candidates,
/// deduplicated, topped up from the candidates in retrieval order.
pub fn select_overview(picked: &[&str], candidates: &[ScoredProduct], count: usize) -> Vec<String> {
    let known: HashSet<&str> = candidates.iter().map(ScoredProduct::id).collect();
    let mut seen = HashSet::new();
    picked
        .iter()
        .copied()
        .filter(|id| known.contains(id))
        .chain(candidates.iter().map(ScoredProduct::id))
        .filter(|id| seen.insert(*id))
        .take(count)
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Classification and short-circuit composers
// =============================================================================

pub async fn classify(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let model = state.model();
    let decision = ctx
        .router
        .classify(&ctx.services, state.message(), state.history(), model.as_deref())
        .await?;

    info!(
        router = %ctx.router.kind(),
        category = %decision.classification.category,
        confidence = decision.classification.confidence,
        "message classified"
    );

    Ok(RequestState {
        classification: Overwrite::new(decision.classification),
        telemetry: Telemetry::row(
            CLASSIFY,
            UsageRow::new(
                decision.input_tokens,
                decision.output_tokens,
                started.elapsed().as_secs_f64(),
            ),
        ),
        ..Default::default()
    })
}

pub async fn refuse(state: RequestState, _ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let category = state
        .classification
        .get()
        .map(|c| c.category)
        .unwrap_or(Category::DoNotRespond);
    Ok(RequestState {
        output: Overwrite::new(ResponseEnvelope::refusal(category)),
        telemetry: Telemetry::row(REFUSE, no_tokens(started)),
        ..Default::default()
    })
}

pub async fn chitchat(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let prompt = ctx.services.prompt("chitchat", &[("query", state.message())])?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    Ok(RequestState {
        output: Overwrite::new(envelope_from(EnvelopeKind::Chitchat, &completion)),
        telemetry: Telemetry::row(CHITCHAT, row(started, &completion)),
        ..Default::default()
    })
}

pub async fn low_confidence(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let classification = state
        .classification
        .get()
        .and_then(|c| serde_json::to_string(c).ok())
        .unwrap_or_else(|| "unavailable".to_string());
    let prompt = ctx.services.prompt(
        "low_confidence",
        &[("query", state.message()), ("classification", &classification)],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let mut envelope = envelope_from(EnvelopeKind::LowConfidence, &completion);
    if envelope.follow_up_question.is_empty() {
        envelope.follow_up_question = CLARIFY_FOLLOW_UP.to_string();
    }

    Ok(RequestState {
        output: Overwrite::new(envelope),
        telemetry: Telemetry::row(LOW_CONFIDENCE, row(started, &completion)),
        ..Default::default()
    })
}

// =============================================================================
// Vague-intent path
// =============================================================================

pub async fn generate_query(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let attributes = Attribute::filter_descriptions();
    let prompt = ctx.services.prompt(
        "semantic_search_query",
        &[("query", state.message()), ("attribute_descriptions", &attributes)],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let reply = parse_object(&completion.text);
    let context = QueryContext::from_json(&reply, ctx.config.default_product_count);
    let query = str_field(&reply, "query").unwrap_or(state.message()).to_string();
    debug!(query = %query, count = context.num_products_requested, "semantic query generated");

    Ok(RequestState {
        semantic_query: Overwrite::new(query),
        filters: Overwrite::new(context.filters.clone()),
        query_context: Overwrite::new(context),
        telemetry: Telemetry::row(GENERATE_QUERY, row(started, &completion)),
        ..Default::default()
    })
}

/// Semantic and filtered hybrid searches run concurrently, then union.
pub async fn retrieve_overview(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let count = product_count(&state, &ctx);
    let query = state
        .semantic_query
        .get()
        .cloned()
        .unwrap_or_else(|| state.message().to_string());
    let predicate = build_predicate_lossy(&state.filter_map());
    let semantic_limit = match predicate {
        Some(_) => 2 * count,
        None => 4 * count,
    };

    let (semantic, hybrid) = tokio::join!(
        ctx.services
            .search_products(&query, semantic_limit, None, SearchMode::Semantic),
        ctx.services
            .search_products(&query, count, predicate.as_ref(), SearchMode::Hybrid),
    );
    let merged = union_by_id(
        recover(semantic, "semantic")
            .into_iter()
            .chain(recover(hybrid, "hybrid")),
    );
    info!(candidates = merged.len(), "overview retrieval finished");

    Ok(RequestState {
        search_results: Append::new(merged),
        telemetry: Telemetry::row(RETRIEVE_OVERVIEW, no_tokens(started)),
        ..Default::default()
    })
}

pub async fn compose_overview(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let count = product_count(&state, &ctx);
    let candidates = state.search_results.as_slice();
    let products = products_json(candidates);
    let count_text = count.to_string();
    let prompt = ctx.services.prompt(
        "vague_intent_response",
        &[
            ("query", state.message()),
            ("products", &products),
            ("product_count", &count_text),
        ],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let envelope = envelope_from(EnvelopeKind::VagueIntentProduct, &completion);
    let selected = select_overview(&envelope.product_ids(), candidates, count);
    let envelope = envelope.with_products(selected);

    Ok(RequestState {
        output: Overwrite::new(envelope),
        telemetry: Telemetry::row(COMPOSE_OVERVIEW, row(started, &completion)),
        ..Default::default()
    })
}

// =============================================================================
// Clear-intent path
// =============================================================================

pub async fn decompose(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let attributes = Attribute::filter_descriptions();
    let expansions = ctx.config.query_expansions.to_string();
    let prompt = ctx.services.prompt(
        "query_decompose",
        &[
            ("query", state.message()),
            ("num_expansions", &expansions),
            ("attribute_descriptions", &attributes),
        ],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let reply = parse_object(&completion.text);
    let context = QueryContext::from_json(&reply, ctx.config.default_product_count);

    let mut expanded = vec![state.message().to_string()];
    let alternatives = reply
        .get("expanded_queries")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim);
    for query in alternatives {
        if expanded.len() > ctx.config.query_expansions {
            break;
        }
        if !query.is_empty() && !expanded.iter().any(|q| q.eq_ignore_ascii_case(query)) {
            expanded.push(query.to_string());
        }
    }

    info!(
        filters = context.filters.len(),
        expansions = expanded.len() - 1,
        count = context.num_products_requested,
        "query decomposed"
    );

    Ok(RequestState {
        filters: Overwrite::new(context.filters.clone()),
        query_context: Overwrite::new(context),
        expanded_queries: Overwrite::new(expanded),
        telemetry: Telemetry::row(DECOMPOSE, row(started, &completion)),
        ..Default::default()
    })
}

/// One filtered hybrid search per query, run concurrently and deduplicated
/// in query order.
pub async fn retrieve(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let count = product_count(&state, &ctx);
    let predicate = build_predicate_lossy(&state.filter_map());
    let queries = match state.expanded_queries.get() {
        Some(queries) if !queries.is_empty() => queries.clone(),
        _ => vec![state.message().to_string()],
    };

    let searches = queries.iter().map(|query| {
        ctx.services
            .search_products(query, count, predicate.as_ref(), SearchMode::Hybrid)
    });
    let results = join_all(searches).await;
    let unique = union_by_id(results.into_iter().flat_map(|hits| recover(hits, "hybrid")));
    info!(queries = queries.len(), candidates = unique.len(), "retrieval finished");

    Ok(RequestState {
        search_results: Append::new(unique),
        telemetry: Telemetry::row(RETRIEVE, no_tokens(started)),
        ..Default::default()
    })
}

/// Keeps the model's order and every candidate it returns, dropping
/// duplicates and ids that were not candidates.
pub async fn rerank(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let candidates = state.search_results.as_slice();
    if candidates.is_empty() {
        return Ok(RequestState {
            reranking: Overwrite::new(json!({
                "products": [],
                "justification": "No candidate products were found."
            })),
            final_results: Overwrite::new(Vec::new()),
            telemetry: Telemetry::row(RERANK, no_tokens(started)),
            ..Default::default()
        });
    }

    // Only a hint to the model; every known id it returns is kept.
    let top_k = ctx.config.rerank_top_k.max(product_count(&state, &ctx));
    let filters = serde_json::to_string(&state.filter_map())?;
    let query_context = serde_json::to_string(&state.context())?;
    let products = products_json(candidates);
    let attributes = Attribute::filter_descriptions();
    let top_k_text = top_k.to_string();
    let prompt = ctx.services.prompt(
        "product_reranking",
        &[
            ("query", state.message()),
            ("filters", &filters),
            ("products", &products),
            ("attribute_descriptions", &attributes),
            ("query_context", &query_context),
            ("top_k", &top_k_text),
        ],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let reply = parse_object(&completion.text);
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut ranked = Vec::new();
    for item in reply.get("products").and_then(Value::as_array).into_iter().flatten() {
        let id = match item {
            Value::String(id) => Some(id.trim()),
            other => str_field(other, "product_id"),
        };
        let Some(product) = id.and_then(|id| candidates.iter().find(|c| c.id() == id)) else {
            debug!(item = %item, "reranker returned an unknown product");
            continue;
        };
        if seen.insert(product.id().to_string()) {
            ranked.push(product.clone());
            kept.push(item.clone());
        }
    }

    let reranking = json!({
        "products": kept,
        "justification": str_field(&reply, "justification").unwrap_or_default(),
    });
    info!(candidates = candidates.len(), kept = ranked.len(), "reranked");

    Ok(RequestState {
        reranking: Overwrite::new(reranking),
        final_results: Overwrite::new(ranked),
        telemetry: Telemetry::row(RERANK, row(started, &completion)),
        ..Default::default()
    })
}

/// Products follow the rerank order exactly, whatever the model lists.
pub async fn compose_answer(state: RequestState, ctx: Arc<PipelineContext>) -> NodeResult {
    let started = Instant::now();
    let final_results: Vec<ScoredProduct> = match state.final_results.get() {
        Some(ranked) => ranked.clone(),
        None => state
            .search_results
            .iter()
            .take(ctx.config.rerank_top_k)
            .cloned()
            .collect(),
    };
    let reranking = state
        .reranking
        .get()
        .cloned()
        .unwrap_or_else(|| json!({"products": []}))
        .to_string();
    let products = products_json(&final_results);
    let prompt = ctx.services.prompt(
        "clear_intent_response",
        &[
            ("query", state.message()),
            ("reranking_result", &reranking),
            ("products", &products),
        ],
    )?;
    let completion = ctx
        .services
        .complete(prompt, state.history(), with_request_model(state.model()))
        .await?;

    let envelope = envelope_from(EnvelopeKind::ClearIntentProduct, &completion)
        .with_products(final_results.iter().map(|p| p.id().to_string()));

    Ok(RequestState {
        output: Overwrite::new(envelope),
        telemetry: Telemetry::row(COMPOSE_ANSWER, row(started, &completion)),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    fn scored(id: &str) -> ScoredProduct {
        ScoredProduct::new(Product::new(id, id.to_uppercase()), 0.5)
    }

    #[test]
    fn test_union_keeps_first_occurrence() {
        let merged = union_by_id([scored("a"), scored("b"), scored("a"), scored("c")]);
        let ids: Vec<_> = merged.iter().map(ScoredProduct::id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_overview_selection() {
        let candidates = [scored("a"), scored("b"), scored("c"), scored("d")];
        assert_eq!(
            select_overview(&["c", "ghost", "c", "a"], &candidates, 3),
            vec!["c", "a", "b"]
        );
        assert_eq!(select_overview(&[], &candidates, 2), vec!["a", "b"]);
        assert!(select_overview(&["a"], &[], 5).is_empty());
    }
}
