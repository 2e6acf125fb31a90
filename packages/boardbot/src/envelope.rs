//! The response envelope every composer produces.

use flowgraph::Telemetry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::str_field;
use crate::types::{Category, Classification};

pub const ERROR_MESSAGE: &str = "An error occurred while processing your request.";
pub const ERROR_FOLLOW_UP: &str = "Would you like to try your query again?";

/// Envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    ClearIntentProduct,
    VagueIntentProduct,
    Chitchat,
    Politics,
    DoNotRespond,
    LowConfidence,
    Error,
}

impl From<Category> for EnvelopeKind {
    fn from(category: Category) -> Self {
        match category {
            Category::ClearIntentProduct => Self::ClearIntentProduct,
            Category::VagueIntentProduct => Self::VagueIntentProduct,
            Category::Chitchat => Self::Chitchat,
            Category::Politics => Self::Politics,
            Category::DoNotRespond => Self::DoNotRespond,
        }
    }
}

/// A product reference in the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub product_id: String,
}

impl ProductRef {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
        }
    }
}

/// Per-stage usage plus the classification that routed the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default)]
    pub classification_result: Option<Classification>,
    #[serde(default)]
    pub input_token_usage: IndexMap<String, u32>,
    #[serde(default)]
    pub output_token_usage: IndexMap<String, u32>,
    #[serde(default)]
    pub time_taken: IndexMap<String, f64>,
}

impl EnvelopeMetadata {
    pub fn from_telemetry(classification: Option<Classification>, telemetry: &Telemetry) -> Self {
        Self {
            classification_result: classification,
            input_token_usage: telemetry.input_tokens(),
            output_token_usage: telemetry.output_tokens(),
            time_taken: telemetry.time_taken(),
        }
    }
}

/// Final reply for one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub message: String,
    pub products: Vec<ProductRef>,
    pub reasoning: String,
    pub follow_up_question: String,
    pub metadata: EnvelopeMetadata,
}

impl ResponseEnvelope {
    pub fn new(kind: EnvelopeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            products: Vec::new(),
            reasoning: String::new(),
            follow_up_question: String::new(),
            metadata: EnvelopeMetadata::default(),
        }
    }

    /// Envelope from a composer's JSON reply. Missing fields stay empty.
    /// Products may be `{"product_id": ..}` objects or bare id strings.
    pub fn from_reply(kind: EnvelopeKind, reply: &Value) -> Self {
        let products = reply
            .get("products")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(id) => Some(id.trim()),
                        other => str_field(other, "product_id"),
                    })
                    .filter(|id| !id.is_empty())
                    .map(ProductRef::new)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            kind,
            message: str_field(reply, "message").unwrap_or_default().to_string(),
            products,
            reasoning: str_field(reply, "reasoning").unwrap_or_default().to_string(),
            follow_up_question: str_field(reply, "follow_up_question")
                .unwrap_or_default()
                .to_string(),
            metadata: EnvelopeMetadata::default(),
        }
    }

    /// Fixed reply for categories the assistant declines to discuss.
    pub fn refusal(category: Category) -> Self {
        let message = match category {
            Category::Politics => "I'm sorry, I'm not programmed to discuss politics.",
            _ => "I'm sorry, I can't help with that request.",
        };
        Self::new(category.into(), message)
            .with_reasoning(format!("Requests classified as {category} are declined."))
            .with_follow_up(
                "Is there anything about computer hardware, such as development boards or embedded systems, I can help you with?",
            )
    }

    /// Generic failure reply; `reason` lands in `reasoning`.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Error, ERROR_MESSAGE)
            .with_reasoning(reason)
            .with_follow_up(ERROR_FOLLOW_UP)
    }

    pub fn with_products<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = ids.into_iter().map(ProductRef::new).collect();
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_follow_up(mut self, question: impl Into<String>) -> Self {
        self.follow_up_question = question.into();
        self
    }

    pub fn with_metadata(mut self, metadata: EnvelopeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn product_ids(&self) -> Vec<&str> {
        self.products.iter().map(|p| p.product_id.as_str()).collect()
    }

    pub fn is_error(&self) -> bool {
        self.kind == EnvelopeKind::Error
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
