//! OpenAI implementation of [`LanguageModel`].

use async_trait::async_trait;
use openai_client::{ChatRequest, Message, OpenAIClient};
use tracing::debug;

use super::tokens::TokenCounter;
use crate::error::ModelError;
use crate::traits::{ChatTurn, Completion, GenerateRequest, LanguageModel, Role};
use crate::types::ModelSettings;

/// History turns forwarded with each request.
pub const HISTORY_WINDOW: usize = 5;

/// Chat-completion model backed by `openai-client`.
#[derive(Debug, Clone)]
pub struct OpenAIModel {
    client: OpenAIClient,
    settings: ModelSettings,
}

impl OpenAIModel {
    pub fn new(client: OpenAIClient) -> Self {
        Self {
            client,
            settings: ModelSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Messages exactly as they will be sent.
    pub fn build_messages(request: &GenerateRequest) -> Vec<Message> {
        let skip = request.history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages = Vec::with_capacity(HISTORY_WINDOW + 2);
        if !request.system.is_empty() {
            messages.push(Message::system(&request.system));
        }
        messages.extend(request.history.iter().skip(skip).map(turn_message));
        messages.push(Message::user(&request.user));
        messages
    }
}

fn turn_message(turn: &ChatTurn) -> Message {
    match turn.role {
        Role::User => Message::user(&turn.content),
        Role::Assistant => Message::assistant(&turn.content),
    }
}

#[async_trait]
impl LanguageModel for OpenAIModel {
    async fn generate(&self, request: GenerateRequest) -> Result<Completion, ModelError> {
        let model = request.model.clone().unwrap_or_else(|| self.settings.model.clone());
        let counter = TokenCounter::for_model(&model)?;
        let messages = Self::build_messages(&request);
        let input_tokens = counter
            .count_messages(messages.iter().map(|m| (m.role.as_str(), m.content.as_str())));

        let mut chat = ChatRequest::new(&model)
            .messages(messages)
            .temperature(request.temperature.unwrap_or(self.settings.temperature))
            .top_p(request.top_p.unwrap_or(self.settings.top_p))
            .token_budget(request.max_tokens.unwrap_or(self.settings.max_tokens));
        if let Some(seed) = self.settings.seed {
            chat = chat.seed(seed);
        }

        let response = self.client.chat_completion(chat).await?;
        let output_tokens = counter.count(&response.content);

        debug!(
            prompt = %request.prompt,
            model = %model,
            input_tokens,
            output_tokens,
            "completion received"
        );

        Ok(Completion::new(response.content, input_tokens, output_tokens))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_truncated_to_window() {
        let history: Vec<ChatTurn> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("q{i}"))
                } else {
                    ChatTurn::assistant(format!("a{i}"))
                }
            })
            .collect();
        let request = GenerateRequest::new("chitchat", "sys", "latest").with_history(history);
        let messages = OpenAIModel::build_messages(&request);

        assert_eq!(messages.len(), 1 + HISTORY_WINDOW + 1);
        assert_eq!(messages[0], Message::system("sys"));
        assert_eq!(messages[1], Message::assistant("a3"));
        assert_eq!(messages.last(), Some(&Message::user("latest")));
    }

    #[test]
    fn test_empty_system_is_omitted() {
        let request = GenerateRequest::new("x", "", "hello");
        assert_eq!(OpenAIModel::build_messages(&request), vec![Message::user("hello")]);
    }
}
