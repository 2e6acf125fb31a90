//! Language-model trait.
//!
//! Pipelines never talk to a provider directly; they build a
//! [`GenerateRequest`] and hand it to whatever [`LanguageModel`] the
//! application wired in (OpenAI in production, `MockModel` in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Who said a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One prior message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion request.
///
/// Unset parameters fall back to the model's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Name of the catalogue prompt that produced this request.
    pub prompt: String,
    pub system: String,
    pub user: String,
    pub history: Vec<ChatTurn>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Model reply plus token accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Completion {
    pub fn new(text: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            text: text.into(),
            input_tokens,
            output_tokens,
        }
    }
}

/// Chat-completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion. Transport retries, if any, happen inside the
    /// implementation; an `Err` here is final.
    async fn generate(&self, request: GenerateRequest) -> Result<Completion, ModelError>;

    /// Short provider name for logs.
    fn name(&self) -> &str {
        "model"
    }
}
