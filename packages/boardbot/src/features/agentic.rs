//! Agentic feature extraction: initial pass, then bounded web-search rounds
//! for missing and low-confidence attributes.
//!
//! ```text
//! store_and_chunk ─ initial_extract ─┬─ search_missing ─ fill_missing ──────────┐
//!                                    ├─ search_low_confidence ─ refine_low_conf ─┤
//!                                    └─ END ◄──────────── next_step ◄───────────┘
//! ```
//!
//! Every node falls through on error. Search nodes advance their attempt
//! counter even when the web search fails, so both loops always run out.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use flowgraph::{
    Append, CompiledGraph, ErrorPolicy, Execution, GraphBuilder, GraphError, NodeError, Overwrite,
    Reducer, Telemetry, UsageRow, END,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::merge::FeatureMap;
use super::query::construct_search_query;
use super::state::ExtractorState;
use super::{ExtractionResult, FeatureExtraction};
use crate::ai::parse_object;
use crate::error::{Result, ValidationError};
use crate::prompts::RenderedPrompt;
use crate::services::Services;
use crate::traits::{Completion, WebSearchHit};
use crate::types::{Attribute, ExtractionConfig, ExtractorKind};

pub const STORE_AND_CHUNK: &str = "store_and_chunk";
pub const INITIAL_EXTRACT: &str = "initial_extract";
pub const SEARCH_MISSING: &str = "search_missing";
pub const FILL_MISSING: &str = "fill_missing";
pub const SEARCH_LOW_CONFIDENCE: &str = "search_low_confidence";
pub const REFINE_LOW_CONFIDENCE: &str = "refine_low_confidence";

/// Chunk probe for the first extraction pass.
pub const INITIAL_PROBE: &str =
    "name, manufacturer, form factor, specifications processor memory storage operating system certifications";

const EXTRACTION_MAX_TOKENS: u32 = 2048;
const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Collaborators and settings shared by every node of one extractor.
pub struct ExtractionContext {
    pub services: Services,
    pub config: ExtractionConfig,
}

type NodeResult = std::result::Result<ExtractorState, NodeError>;

fn usage(stage: &str, row: UsageRow) -> ExtractorState {
    ExtractorState {
        usage_data: Telemetry::row(stage, row),
        ..Default::default()
    }
}

fn elapsed(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

fn model_row(started: Instant, completion: &Completion) -> UsageRow {
    UsageRow::new(completion.input_tokens, completion.output_tokens, elapsed(started))
}

fn names(attributes: &[Attribute]) -> Vec<&'static str> {
    attributes.iter().map(Attribute::as_str).collect()
}

/// Chunk text for `probe`, or the raw text when the index has nothing.
async fn context_for(state: &ExtractorState, ctx: &ExtractionContext, probe: &str) -> String {
    let chunks = ctx
        .services
        .get_relevant_chunks(state.product_id(), probe, ctx.config.chunk_limit)
        .await
        .unwrap_or_else(|error| {
            warn!(error = %error, "chunk lookup failed, using raw text");
            Vec::new()
        });
    debug!(chunks = chunks.len(), probe, "retrieved chunks");
    if chunks.is_empty() {
        return state.raw_data().to_string();
    }
    chunks
        .iter()
        .map(|c| c.chunk_text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn extraction_call(
    ctx: &ExtractionContext,
    prompt: RenderedPrompt,
) -> std::result::Result<Completion, NodeError> {
    let model = ctx.config.model.clone();
    let completion = ctx
        .services
        .complete(prompt, &[], |request| {
            request
                .with_model(model)
                .with_max_tokens(EXTRACTION_MAX_TOKENS)
                .with_temperature(EXTRACTION_TEMPERATURE)
        })
        .await?;
    Ok(completion)
}

// =============================================================================
// Nodes
// =============================================================================

pub async fn store_and_chunk(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    let started = Instant::now();
    let chunks = ctx
        .services
        .store_raw_data(state.product_id(), state.raw_data())
        .await?;
    info!(product_id = state.product_id(), chunks, "raw data stored");
    Ok(usage(STORE_AND_CHUNK, UsageRow::new(0, 0, elapsed(started))))
}

pub async fn initial_extract(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    let started = Instant::now();
    let context = context_for(&state, &ctx, INITIAL_PROBE).await;
    let attributes = Attribute::describe(&Attribute::ALL);
    let prompt = ctx.services.prompt(
        "data_extraction",
        &[("raw_data", &context), ("attribute_descriptions", &attributes)],
    )?;
    let completion = extraction_call(&ctx, prompt).await?;

    let features = FeatureMap::from_reply(&parse_object(&completion.text), 0.0);
    info!(
        extracted = features.len(),
        missing = features.missing().len(),
        "initial extraction finished"
    );

    Ok(ExtractorState {
        extracted_features: features,
        usage_data: Telemetry::row(INITIAL_EXTRACT, model_row(started, &completion)),
        ..Default::default()
    })
}

/// Which loop a search or fill node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Missing,
    LowConfidence,
}

impl Round {
    fn pending(&self, features: &FeatureMap, threshold: f64) -> Vec<Attribute> {
        match self {
            Self::Missing => features.missing(),
            Self::LowConfidence => features.low_confidence(threshold),
        }
    }

    fn targets(&self, state: &ExtractorState, ctx: &ExtractionContext) -> Vec<Attribute> {
        self.pending(&state.extracted_features, ctx.config.confidence_threshold)
    }

    fn attempts(&self, state: &ExtractorState) -> flowgraph::Counter {
        match self {
            Self::Missing => state.missing_feature_attempts,
            Self::LowConfidence => state.low_confidence_attempts,
        }
    }

    fn search_stage(&self) -> &'static str {
        match self {
            Self::Missing => SEARCH_MISSING,
            Self::LowConfidence => SEARCH_LOW_CONFIDENCE,
        }
    }

    fn fill_stage(&self) -> &'static str {
        match self {
            Self::Missing => FILL_MISSING,
            Self::LowConfidence => REFINE_LOW_CONFIDENCE,
        }
    }

    /// Delta advancing this round's counter.
    fn advanced(&self, state: &ExtractorState, row: UsageRow) -> ExtractorState {
        let mut delta = usage(self.search_stage(), row);
        match self {
            Self::Missing => {
                delta.missing_feature_attempts = state.missing_feature_attempts.incremented();
            }
            Self::LowConfidence => {
                delta.low_confidence_attempts = state.low_confidence_attempts.incremented();
            }
        }
        delta
    }
}

/// New domains from `hits`, skipping ones already excluded.
fn new_domains(state: &ExtractorState, hits: &[WebSearchHit]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for domain in hits.iter().map(WebSearchHit::domain) {
        if !state.exclude_domains.iter().any(|d| *d == domain) && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

async fn search_round(round: Round, state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    let started = Instant::now();
    let targets = round.targets(&state, &ctx);
    if targets.is_empty() {
        debug!(stage = round.search_stage(), "nothing to search for");
        return Ok(round.advanced(&state, UsageRow::new(0, 0, elapsed(started))));
    }

    let query = construct_search_query(&state.extracted_features, &targets);
    let exclude = state.exclude_domains();
    info!(
        stage = round.search_stage(),
        attempt = round.attempts(&state).get() + 1,
        targets = ?names(&targets),
        query = %query,
        "searching the web"
    );

    let hits = match ctx.services.web_search(&query, &exclude).await {
        Ok(hits) => hits,
        Err(error) => {
            warn!(stage = round.search_stage(), error = %error, "web search failed, treating as no data");
            return Ok(round.advanced(&state, UsageRow::failed(error.to_string(), elapsed(started))));
        }
    };

    for hit in &hits {
        if let Err(error) = ctx
            .services
            .store_search_results(
                state.product_id(),
                &hit.search_query,
                &hit.search_result,
                &hit.data_source,
            )
            .await
        {
            warn!(source = %hit.data_source, error = %error, "failed to store search result");
        }
    }
    let domains = new_domains(&state, &hits);
    debug!(hits = hits.len(), new_domains = ?domains, "search results stored");

    let mut delta = round.advanced(&state, UsageRow::new(0, 0, elapsed(started)));
    delta.exclude_domains = Append::new(domains);
    match round {
        Round::Missing => delta.missing_features = Append::new(targets),
        Round::LowConfidence => delta.low_confidence_features = Append::new(targets),
    }
    Ok(delta)
}

async fn fill_round(round: Round, state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    let started = Instant::now();
    let targets = round.targets(&state, &ctx);
    if targets.is_empty() {
        return Ok(usage(round.fill_stage(), UsageRow::new(0, 0, elapsed(started))));
    }

    let probe = names(&targets).join(" ");
    let context = context_for(&state, &ctx, &probe).await;
    let record = state.extracted_features.to_prompt_json().to_string();
    let wanted = Attribute::describe(&targets);
    let prompt = match round {
        Round::Missing => ctx.services.prompt(
            "missing_feature_extraction",
            &[
                ("context", &context),
                ("extracted_features", &record),
                ("features_to_extract", &wanted),
            ],
        ),
        Round::LowConfidence => ctx.services.prompt(
            "low_confidence_refinement",
            &[
                ("context", &context),
                ("extracted_features", &record),
                ("features_to_refine", &wanted),
            ],
        ),
    }?;
    let completion = extraction_call(&ctx, prompt).await?;

    let update = FeatureMap::from_reply(&parse_object(&completion.text), 0.0).restricted_to(&targets);
    let mut merged = state.extracted_features.clone();
    merged.reduce(update.clone());
    let stalled = merged == state.extracted_features;
    info!(
        stage = round.fill_stage(),
        returned = update.len(),
        remaining = round.pending(&merged, ctx.config.confidence_threshold).len(),
        stalled,
        "record updated"
    );

    let mut delta = ExtractorState {
        extracted_features: update,
        usage_data: Telemetry::row(round.fill_stage(), model_row(started, &completion)),
        ..Default::default()
    };
    match round {
        Round::Missing => delta.missing_stalled = Overwrite::new(stalled),
        Round::LowConfidence => delta.low_confidence_stalled = Overwrite::new(stalled),
    }
    Ok(delta)
}

pub async fn search_missing(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    search_round(Round::Missing, state, ctx).await
}

pub async fn fill_missing(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    fill_round(Round::Missing, state, ctx).await
}

pub async fn search_low_confidence(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    search_round(Round::LowConfidence, state, ctx).await
}

pub async fn refine_low_confidence(state: ExtractorState, ctx: Arc<ExtractionContext>) -> NodeResult {
    fill_round(Round::LowConfidence, state, ctx).await
}

// =============================================================================
// Routing and wiring
// =============================================================================

/// Next loop to run. A loop is done when its attempts are used up, it has no
/// targets left, or its last fill round changed nothing.
pub fn next_step(state: &ExtractorState, config: &ExtractionConfig) -> &'static str {
    let features = &state.extracted_features;
    if state.missing_feature_attempts.get() < config.max_missing_attempts
        && !state.is_missing_stalled()
        && !features.missing().is_empty()
    {
        return SEARCH_MISSING;
    }
    if state.low_confidence_attempts.get() < config.max_low_confidence_attempts
        && !state.is_low_confidence_stalled()
        && !features.low_confidence(config.confidence_threshold).is_empty()
    {
        return SEARCH_LOW_CONFIDENCE;
    }
    END
}

fn router(config: &ExtractionConfig) -> impl Fn(&ExtractorState) -> &'static str + Send + Sync + 'static {
    let config = config.clone();
    move |state| next_step(state, &config)
}

pub fn build_extraction_graph(
    config: &ExtractionConfig,
) -> std::result::Result<CompiledGraph<ExtractorState, ExtractionContext>, GraphError> {
    let loop_routes = [
        (SEARCH_MISSING, SEARCH_MISSING),
        (SEARCH_LOW_CONFIDENCE, SEARCH_LOW_CONFIDENCE),
        (END, END),
    ];
    GraphBuilder::new()
        .add_node(STORE_AND_CHUNK, store_and_chunk)
        .add_node(INITIAL_EXTRACT, initial_extract)
        .add_node(SEARCH_MISSING, search_missing)
        .add_node(FILL_MISSING, fill_missing)
        .add_node(SEARCH_LOW_CONFIDENCE, search_low_confidence)
        .add_node(REFINE_LOW_CONFIDENCE, refine_low_confidence)
        .set_entry(STORE_AND_CHUNK)
        .add_edge(STORE_AND_CHUNK, INITIAL_EXTRACT)
        .add_conditional_edges(INITIAL_EXTRACT, router(config), loop_routes)
        .add_edge(SEARCH_MISSING, FILL_MISSING)
        .add_conditional_edges(FILL_MISSING, router(config), loop_routes)
        .add_edge(SEARCH_LOW_CONFIDENCE, REFINE_LOW_CONFIDENCE)
        .add_conditional_edges(REFINE_LOW_CONFIDENCE, router(config), loop_routes)
        .on_error(STORE_AND_CHUNK, ErrorPolicy::Continue)
        .on_error(INITIAL_EXTRACT, ErrorPolicy::Continue)
        .on_error(SEARCH_MISSING, ErrorPolicy::Continue)
        .on_error(FILL_MISSING, ErrorPolicy::Continue)
        .on_error(SEARCH_LOW_CONFIDENCE, ErrorPolicy::Continue)
        .on_error(REFINE_LOW_CONFIDENCE, ErrorPolicy::Continue)
        .compile()
}

// =============================================================================
// Extractor
// =============================================================================

/// Graph-driven extractor with web-search refinement.
pub struct FeatureExtractor {
    context: Arc<ExtractionContext>,
    graph: CompiledGraph<ExtractorState, ExtractionContext>,
}

impl FeatureExtractor {
    pub fn new(services: Services, config: ExtractionConfig) -> Result<Self> {
        let graph = build_extraction_graph(&config)?;
        Ok(Self {
            context: Arc::new(ExtractionContext { services, config }),
            graph,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.context.config
    }

    /// Run the graph and return the full execution, for callers that need
    /// the visited path or the unfiltered record.
    pub async fn execute(&self, text: &str, product_id: &str) -> Result<Execution<ExtractorState>> {
        let state = initial_state(text, product_id)?;
        Ok(self.graph.invoke(state, self.context.clone()).await)
    }

    /// Like [`FeatureExtraction::extract`] but abandons the run once `cancel` fires.
    pub async fn extract_with_cancel(
        &self,
        text: &str,
        product_id: &str,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult> {
        let state = initial_state(text, product_id)?;
        let execution = self
            .graph
            .invoke_with_cancel(state, self.context.clone(), cancel)
            .await?;
        Ok(self.finish(execution))
    }

    fn finish(&self, execution: Execution<ExtractorState>) -> ExtractionResult {
        let state = execution.state;
        let threshold = self.context.config.confidence_threshold;
        info!(
            steps = execution.visited.len(),
            halt = ?execution.halt,
            missing_attempts = state.missing_feature_attempts.get(),
            low_confidence_attempts = state.low_confidence_attempts.get(),
            "feature extraction finished"
        );
        ExtractionResult {
            extracted_data: state.extracted_features.confident(threshold),
            usage: state.usage_data,
            features: state.extracted_features,
        }
    }
}

fn initial_state(text: &str, product_id: &str) -> Result<ExtractorState> {
    let product_id = product_id.trim();
    if product_id.is_empty() {
        return Err(ValidationError::EmptyProductId.into());
    }
    Ok(ExtractorState::new(product_id, text))
}

#[async_trait]
impl FeatureExtraction for FeatureExtractor {
    async fn extract(&self, text: &str, product_id: &str) -> Result<ExtractionResult> {
        let execution = self.execute(text, product_id).await?;
        Ok(self.finish(execution))
    }

    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Agentic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ExtractedFeature;
    use crate::testing::{test_services_full, MemoryIndex, MockModel, MockWebSearcher};
    use flowgraph::{Counter, Halt};
    use serde_json::json;

    fn complete_reply(confidence: f64) -> String {
        let record: serde_json::Map<String, serde_json::Value> = Attribute::ALL
            .into_iter()
            .map(|a| (a.as_str().to_string(), json!({"value": "KNOWN", "confidence": confidence})))
            .collect();
        serde_json::Value::Object(record).to_string()
    }

    fn extractor(model: MockModel, web: MockWebSearcher) -> FeatureExtractor {
        let services = test_services_full(model, MemoryIndex::new(), web);
        FeatureExtractor::new(services, ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn test_graph_compiles() {
        let graph = build_extraction_graph(&ExtractionConfig::default()).unwrap();
        assert_eq!(graph.entry(), STORE_AND_CHUNK);
        assert_eq!(graph.node_names().count(), 6);
    }

    #[test]
    fn test_router_prefers_missing_then_low_confidence() {
        let config = ExtractionConfig::default();
        let mut state = ExtractorState::new("p1", "");
        assert_eq!(next_step(&state, &config), SEARCH_MISSING);

        state.missing_feature_attempts = Counter::new(2);
        // nothing present yet, so nothing is low-confidence
        assert_eq!(next_step(&state, &config), END);

        for attribute in Attribute::ALL {
            state
                .extracted_features
                .insert(attribute, ExtractedFeature::new(attribute, "x".into(), 0.5));
        }
        state.missing_feature_attempts = Counter::new(0);
        assert_eq!(next_step(&state, &config), SEARCH_LOW_CONFIDENCE);

        state.low_confidence_stalled = Overwrite::new(true);
        assert_eq!(next_step(&state, &config), END);
    }

    #[tokio::test]
    async fn test_confident_first_pass_ends_immediately() {
        let model = MockModel::new().with_reply("data_extraction", complete_reply(0.9));
        let web = MockWebSearcher::new();
        let extractor = extractor(model, web.clone());

        let execution = extractor.execute("CONGA-TC570 datasheet", "p1").await.unwrap();
        assert_eq!(execution.visited, vec![STORE_AND_CHUNK, INITIAL_EXTRACT]);
        assert_eq!(execution.halt, Halt::Terminal);
        assert!(web.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_search_still_counts_attempt() {
        let model = MockModel::new();
        let web = MockWebSearcher::new().failing();
        let extractor = extractor(model, web.clone());

        let execution = extractor.execute("", "p1").await.unwrap();
        let state = &execution.state;
        assert!(state.missing_feature_attempts.get() >= 1);
        assert_eq!(state.usage_data.rows(SEARCH_MISSING)[0].input_tokens, 0);
        assert!(state.usage_data.rows(SEARCH_MISSING)[0].error.is_some());
    }

    #[tokio::test]
    async fn test_empty_product_id_is_rejected() {
        let extractor = extractor(MockModel::new(), MockWebSearcher::new());
        let result = extractor.extract("text", "  ").await;
        assert!(matches!(
            result,
            Err(crate::error::BoardbotError::Validation(ValidationError::EmptyProductId))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_an_error() {
        let extractor = extractor(MockModel::new(), MockWebSearcher::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = extractor.extract_with_cancel("text", "p1", cancel).await;
        assert!(matches!(result, Err(crate::error::BoardbotError::Graph(GraphError::Cancelled))));
    }
}
