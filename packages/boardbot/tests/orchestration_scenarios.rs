//! End-to-end runs of the query orchestration graph against scripted
//! collaborators.
//!
//! Each test drives [`Assistant::respond`] with the LLM router so the route
//! is decided by a scripted `route_classification` reply, then checks the
//! envelope and the calls the collaborators saw.

use boardbot::envelope::ERROR_MESSAGE;
use boardbot::testing::{test_services, test_services_with_index, MemoryIndex, MockModel};
use boardbot::{Assistant, Attribute, EnvelopeKind, PipelineConfig, Product, UserMessage};

fn route(category: &str, confidence: u32) -> String {
    format!(
        r#"{{"category": "{category}", "confidence": {confidence}, "justification": "scripted"}}"#
    )
}

fn com_express(id: &str, name: &str, memory: &str) -> Product {
    Product::new(id, name)
        .with(Attribute::Manufacturer, "Congatec")
        .with(Attribute::FormFactor, "COM Express")
        .with(Attribute::ProcessorManufacturer, "Intel")
        .with(Attribute::Memory, memory)
}

/// Three COM Express modules that satisfy the decomposed filters and two that
/// do not.
fn catalogue() -> MemoryIndex {
    MemoryIndex::new().with_products([
        com_express("m1", "conga-TC570", "16.0GB DDR4"),
        com_express("m2", "conga-TS570", "32.0GB DDR4"),
        com_express("m3", "conga-TR4", "64.0GB DDR4"),
        com_express("x1", "conga-TC175", "8.0GB DDR4"),
        Product::new("x2", "Jetson Orin Nano")
            .with(Attribute::Manufacturer, "NVIDIA")
            .with(Attribute::FormFactor, "SO-DIMM")
            .with(Attribute::ProcessorManufacturer, "NVIDIA")
            .with(Attribute::Memory, "32.0GB LPDDR5"),
    ])
}

const DECOMPOSE_REPLY: &str = r#"```json
{
  "filters": {
    "form_factor": "COM Express",
    "processor_manufacturer": "Intel",
    "memory": "16.0GB-64.0GB DDR4"
  },
  "sort": null,
  "entities": {"form_factor": "COM Express"},
  "num_products_requested": 3,
  "expanded_queries": ["Intel COM Express module with DDR4", "COM Express carrier compatible Intel module"]
}
```"#;

const RERANK_REPLY: &str = r#"{
  "products": [
    {"product_id": "m2", "relevance_score": 0.93},
    {"product_id": "ghost", "relevance_score": 0.90},
    {"product_id": "m3", "relevance_score": 0.88},
    {"product_id": "m1", "relevance_score": 0.71}
  ],
  "justification": "m2 balances memory and price"
}"#;

const ANSWER_REPLY: &str = r#"{
  "message": "Here are three Intel COM Express modules with 16 to 64GB of DDR4.",
  "products": [{"product_id": "m1"}],
  "reasoning": "All three satisfy the form factor, vendor and memory constraints.",
  "follow_up_question": "Do you need an extended temperature range?"
}"#;

fn clear_intent_model() -> MockModel {
    MockModel::new()
        .with_reply("route_classification", route("clear_intent_product", 92))
        .with_reply("query_decompose", DECOMPOSE_REPLY)
        .with_reply("product_reranking", RERANK_REPLY)
        .with_reply("clear_intent_response", ANSWER_REPLY)
}

fn llm_message(text: &str) -> UserMessage {
    UserMessage::new(text).with_router("llm")
}

#[tokio::test]
async fn test_every_reranked_product_reaches_the_envelope() {
    let ids: Vec<String> = (1..=12).map(|i| format!("b{i:02}")).collect();
    let index = MemoryIndex::new().with_products(
        ids.iter()
            .map(|id| com_express(id, &format!("conga-{id}"), "32.0GB DDR4")),
    );
    let decompose = r#"{
      "filters": {"form_factor": "COM Express"},
      "num_products_requested": 12,
      "expanded_queries": []
    }"#;
    let ranked: Vec<&str> = ids.iter().rev().map(String::as_str).collect();
    let rerank = serde_json::json!({
        "products": ranked.iter().map(|id| serde_json::json!({"product_id": id})).collect::<Vec<_>>(),
        "justification": "all twelve fit"
    })
    .to_string();
    let model = MockModel::new()
        .with_reply("route_classification", route("clear_intent_product", 90))
        .with_reply("query_decompose", decompose)
        .with_reply("product_reranking", rerank)
        .with_reply("clear_intent_response", ANSWER_REPLY);
    let assistant = Assistant::new(
        test_services_with_index(model, index),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message("Show me twelve COM Express modules"))
        .await;

    assert_eq!(envelope.kind, EnvelopeKind::ClearIntentProduct);
    assert_eq!(envelope.product_ids(), ranked);
}

#[tokio::test]
async fn test_politics_is_refused_without_retrieval() {
    let model = MockModel::new().with_reply("route_classification", route("politics", 97));
    let index = MemoryIndex::new();
    let assistant = Assistant::new(
        test_services_with_index(model.clone(), index.clone()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message("Who should I vote for in the next election?"))
        .await;

    assert_eq!(envelope.kind, EnvelopeKind::Politics);
    assert!(envelope.products.is_empty());
    assert!(envelope.message.contains("politics"));
    assert!(envelope.follow_up_question.contains("hardware"));
    assert!(index.product_searches().is_empty());
    assert_eq!(model.prompts(), vec!["route_classification"]);

    let classification = envelope.metadata.classification_result.unwrap();
    assert_eq!(classification.confidence, 97.0);
}

#[tokio::test]
async fn test_clear_intent_returns_reranked_matches() {
    let model = clear_intent_model();
    let index = catalogue();
    let assistant = Assistant::new(
        test_services_with_index(model.clone(), index.clone()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message(
            "I need Intel COM Express modules with between 16 and 64GB of DDR4",
        ))
        .await;

    assert_eq!(envelope.kind, EnvelopeKind::ClearIntentProduct);
    assert_eq!(envelope.product_ids(), vec!["m2", "m3", "m1"]);
    assert_eq!(envelope.follow_up_question, "Do you need an extended temperature range?");
    assert_eq!(
        model.prompts(),
        vec![
            "route_classification",
            "query_decompose",
            "product_reranking",
            "clear_intent_response",
        ]
    );

    // One filtered search for the message plus one per expansion.
    let searches = index.product_searches();
    assert_eq!(searches.len(), 3);
    assert!(searches.iter().all(|call| matches!(
        call,
        boardbot::testing::MockIndexCall::SearchProducts { filtered: true, .. }
    )));
}

#[tokio::test]
async fn test_clear_intent_metadata_accounts_for_every_call() {
    let model = clear_intent_model();
    let assistant = Assistant::new(
        test_services_with_index(model.clone(), catalogue()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message("Intel COM Express with DDR4 memory"))
        .await;
    let metadata = &envelope.metadata;

    let stages: Vec<&str> = metadata.input_token_usage.keys().map(String::as_str).collect();
    assert_eq!(
        stages,
        vec!["classify", "decompose", "retrieve", "rerank", "compose_answer"]
    );
    assert_eq!(
        metadata.input_token_usage.values().sum::<u32>(),
        model.total_input_tokens()
    );
    assert_eq!(
        metadata.output_token_usage.values().sum::<u32>(),
        model.total_output_tokens()
    );
    assert_eq!(metadata.input_token_usage["retrieve"], 0);
    assert!(metadata.time_taken.values().all(|seconds| *seconds >= 0.0));
}

#[tokio::test]
async fn test_vague_intent_overview_lists_distinct_products() {
    let products = (1..=8).map(|n| {
        Product::new(format!("p{n}"), format!("Robotics Board {n}"))
            .with(Attribute::FormFactor, "Pico-ITX")
    });
    let model = MockModel::new()
        .with_reply("route_classification", route("vague_intent_product", 84))
        .with_reply(
            "semantic_search_query",
            r#"{"query": "compact robotics board", "filters": {}, "num_products_requested": 5}"#,
        )
        .with_reply(
            "vague_intent_response",
            r#"{
              "message": "Here is a mix of small boards used in robotics.",
              "products": [{"product_id": "p4"}, {"product_id": "p4"}, {"product_id": "nope"}, {"product_id": "p7"}],
              "reasoning": "Small form factors suit mobile robots.",
              "follow_up_question": "Do you need onboard AI acceleration?"
            }"#,
        );
    let index = MemoryIndex::new().with_products(products);
    let assistant = Assistant::new(
        test_services_with_index(model, index.clone()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message("What's good for a small robot?"))
        .await;

    assert_eq!(envelope.kind, EnvelopeKind::VagueIntentProduct);
    let ids = envelope.product_ids();
    assert_eq!(ids.len(), 5);
    assert_eq!(&ids[..2], &["p4", "p7"]);
    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 5);

    // One semantic and one hybrid search, run together.
    assert_eq!(index.product_searches().len(), 2);
}

#[tokio::test]
async fn test_low_confidence_asks_for_clarification() {
    let model = MockModel::new()
        .with_reply("route_classification", route("clear_intent_product", 35))
        .with_reply("low_confidence", r#"{"message": "I'm not sure what you need yet."}"#);
    let index = catalogue();
    let assistant = Assistant::new(
        test_services_with_index(model.clone(), index.clone()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant.respond(llm_message("boards?")).await;

    assert_eq!(envelope.kind, EnvelopeKind::LowConfidence);
    assert!(envelope.products.is_empty());
    assert!(!envelope.follow_up_question.is_empty());
    assert!(index.product_searches().is_empty());
    assert_eq!(model.prompts(), vec!["route_classification", "low_confidence"]);
}

#[tokio::test]
async fn test_failed_classification_falls_back_to_clarification() {
    let model = MockModel::new()
        .failing("route_classification")
        .with_reply("low_confidence", r#"{"message": "Could you rephrase that?"}"#);
    let assistant = Assistant::new(test_services(model), PipelineConfig::default()).unwrap();

    let envelope = assistant.respond(llm_message("Find me a board")).await;

    assert_eq!(envelope.kind, EnvelopeKind::LowConfidence);
    assert!(envelope.metadata.input_token_usage.contains_key("classify"));
}

#[tokio::test]
async fn test_failed_decomposition_still_answers() {
    let model = clear_intent_model().failing("query_decompose");
    let index = catalogue();
    let assistant = Assistant::new(
        test_services_with_index(model.clone(), index.clone()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant.respond(llm_message("conga modules")).await;

    assert_eq!(envelope.kind, EnvelopeKind::ClearIntentProduct);
    // Without filters only the raw message is searched, unfiltered.
    let searches = index.product_searches();
    assert_eq!(searches.len(), 1);
    assert!(matches!(
        searches[0],
        boardbot::testing::MockIndexCall::SearchProducts { filtered: false, .. }
    ));
}

#[tokio::test]
async fn test_composer_failure_yields_error_envelope() {
    let model = clear_intent_model().failing("clear_intent_response");
    let assistant = Assistant::new(
        test_services_with_index(model, catalogue()),
        PipelineConfig::default(),
    )
    .unwrap();

    let envelope = assistant
        .respond(llm_message("Intel COM Express with DDR4 memory"))
        .await;

    assert!(envelope.is_error());
    assert_eq!(envelope.message, ERROR_MESSAGE);
    assert!(envelope.products.is_empty());
    assert!(!envelope.follow_up_question.is_empty());
}

#[tokio::test]
async fn test_every_envelope_has_all_keys() {
    let cases = [
        (route("politics", 90), llm_message("Thoughts on the senate race?")),
        (route("chitchat", 90), llm_message("Hello there!")),
        (route("do_not_respond", 90), llm_message("asdf qwer")),
        (route("clear_intent_product", 10), llm_message("something")),
    ];

    for (classification, message) in cases {
        let model = MockModel::new()
            .with_reply("route_classification", classification)
            .with_reply("chitchat", r#"{"message": "Hi! Ask me about hardware."}"#);
        let assistant = Assistant::new(test_services(model), PipelineConfig::default()).unwrap();

        let json = assistant.respond(message).await.to_json();
        for key in ["type", "message", "products", "reasoning", "follow_up_question", "metadata"] {
            assert!(json.get(key).is_some(), "missing {key} in {json}");
        }
        assert!(json["products"].is_array());
    }
}
