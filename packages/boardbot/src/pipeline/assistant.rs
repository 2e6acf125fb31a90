//! Request boundary for query orchestration.

use std::sync::Arc;

use flowgraph::{CompiledGraph, Execution};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::graph::build_graph;
use super::state::RequestState;
use super::PipelineContext;
use crate::envelope::{EnvelopeMetadata, ResponseEnvelope};
use crate::error::{BoardbotError, Result, ValidationError};
use crate::routing::classifier_for;
use crate::services::Services;
use crate::traits::ChatTurn;
use crate::types::{PipelineConfig, RouterKind};

fn new_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default = "new_message_id")]
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    pub message: String,
    /// Model override for this request.
    #[serde(default)]
    pub model: Option<String>,
    /// Router override (`llm`, `semantic` or `hybrid`).
    #[serde(default)]
    pub architecture_choice: Option<String>,
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl UserMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            session_id: String::new(),
            message: message.into(),
            model: None,
            architecture_choice: None,
            history: Vec::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.architecture_choice = Some(router.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// An envelope addressed back to the message it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub id: String,
    pub session_id: String,
    pub envelope: ResponseEnvelope,
}

/// Runs the orchestration graph for each message.
pub struct Assistant {
    services: Services,
    config: PipelineConfig,
    graph: Arc<CompiledGraph<RequestState, PipelineContext>>,
}

impl Assistant {
    pub fn new(services: Services, config: PipelineConfig) -> Result<Self> {
        let graph = build_graph(&config)?;
        Ok(Self {
            services,
            config,
            graph: Arc::new(graph),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reject malformed input before any collaborator is called.
    pub fn validate(&self, message: &UserMessage) -> std::result::Result<RouterKind, ValidationError> {
        if message.message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        match message.architecture_choice.as_deref().map(str::trim) {
            Some(choice) if !choice.is_empty() => choice.parse(),
            _ => Ok(self.config.router_kind),
        }
    }

    /// Answer a message. Failures become an error envelope.
    pub async fn respond(&self, message: UserMessage) -> ResponseEnvelope {
        self.run(message, None).await.unwrap_or_else(|error| {
            error!(error = %error, "request failed at the boundary");
            ResponseEnvelope::error(error.to_string())
        })
    }

    /// Like [`respond`](Self::respond) but abandons the run when `cancel`
    /// fires, returning [`GraphError::Cancelled`](flowgraph::GraphError::Cancelled).
    pub async fn respond_with_cancel(
        &self,
        message: UserMessage,
        cancel: CancellationToken,
    ) -> Result<ResponseEnvelope> {
        match self.run(message, Some(cancel)).await {
            Err(BoardbotError::Graph(error)) => Err(BoardbotError::Graph(error)),
            Err(error) => {
                error!(error = %error, "request failed at the boundary");
                Ok(ResponseEnvelope::error(error.to_string()))
            }
            ok => ok,
        }
    }

    /// [`respond`](Self::respond) wrapped with the message's ids.
    pub async fn reply(&self, message: UserMessage) -> AssistantReply {
        let id = format!("{}_response", message.id);
        let session_id = message.session_id.clone();
        AssistantReply {
            id,
            session_id,
            envelope: self.respond(message).await,
        }
    }

    async fn run(
        &self,
        message: UserMessage,
        cancel: Option<CancellationToken>,
    ) -> Result<ResponseEnvelope> {
        let router_kind = self.validate(&message)?;
        let config = self.config.clone().with_router(router_kind);
        let ctx = Arc::new(PipelineContext {
            services: self.services.clone(),
            router: classifier_for(&config),
            config,
        });

        let mut state = RequestState::new(message.message.trim(), message.history);
        if let Some(model) = message.model.filter(|m| !m.trim().is_empty()) {
            state = state.with_model(model);
        }

        info!(message_id = %message.id, router = %router_kind, "handling message");
        let execution = match cancel {
            Some(token) => self.graph.invoke_with_cancel(state, ctx, token).await?,
            None => self.graph.invoke(state, ctx).await,
        };
        Ok(finish(execution))
    }
}

fn finish(execution: Execution<RequestState>) -> ResponseEnvelope {
    let Execution { state, halt, .. } = execution;
    let metadata = EnvelopeMetadata::from_telemetry(state.classification.get().cloned(), &state.telemetry);
    let envelope = state.output.into_inner().unwrap_or_else(|| {
        warn!(halt = ?halt, "run finished without a response");
        ResponseEnvelope::error(format!("no response was composed ({halt:?})"))
    });
    envelope.with_metadata(metadata)
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("services", &self.services)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use crate::testing::{test_services, MockModel};

    fn assistant(model: MockModel) -> Assistant {
        Assistant::new(test_services(model), PipelineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let model = MockModel::new();
        let envelope = assistant(model.clone()).respond(UserMessage::new("   ")).await;
        assert_eq!(envelope.kind, EnvelopeKind::Error);
        assert_eq!(envelope.reasoning, "message text is empty");
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_router_is_rejected() {
        let envelope = assistant(MockModel::new())
            .respond(UserMessage::new("hi").with_router("dynamic-agent"))
            .await;
        assert_eq!(envelope.kind, EnvelopeKind::Error);
        assert!(envelope.reasoning.contains("dynamic-agent"));
    }

    #[tokio::test]
    async fn test_reply_carries_ids() {
        let model = MockModel::new()
            .with_reply(
                "route_classification",
                r#"{"category": "chitchat", "confidence": 95, "justification": "greeting"}"#,
            )
            .with_reply("chitchat", r#"{"message": "Hi!", "follow_up_question": "Need a board?"}"#);
        let message = UserMessage::new("hello").with_session("s1").with_router("llm");
        let id = message.id.clone();

        let reply = assistant(model).reply(message).await;

        assert_eq!(reply.id, format!("{id}_response"));
        assert_eq!(reply.session_id, "s1");
        assert_eq!(reply.envelope.kind, EnvelopeKind::Chitchat);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = assistant(MockModel::new())
            .respond_with_cancel(UserMessage::new("hello"), cancel)
            .await;
        assert!(matches!(result, Err(BoardbotError::Graph(flowgraph::GraphError::Cancelled))));
    }
}
