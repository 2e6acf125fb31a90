//! Query orchestration: classify a message, then answer it along the path
//! its category selects.

use std::sync::Arc;

use crate::routing::RouteClassifier;
use crate::services::Services;
use crate::types::PipelineConfig;

pub mod assistant;
pub mod graph;
pub mod nodes;
pub mod state;

pub use assistant::{Assistant, AssistantReply, UserMessage};
pub use graph::build_graph;
pub use state::RequestState;

/// Context shared by every node of one orchestration run.
pub struct PipelineContext {
    pub services: Services,
    pub config: PipelineConfig,
    pub router: Arc<dyn RouteClassifier>,
}
