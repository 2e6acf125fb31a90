//! Shared collaborator context handed to every graph node.
//!
//! Each call goes through `tokio::time::timeout` with the collaborator's
//! deadline; an expired deadline becomes that collaborator's `Timeout` error.

use std::sync::Arc;

use crate::error::{IndexError, ModelError, PromptError, SearchError};
use crate::index::Predicate;
use crate::prompts::{PromptCatalogue, RenderedPrompt};
use crate::traits::{
    ChatTurn, Chunk, Completion, GenerateRequest, LanguageModel, ProductIndex, RouteHit,
    ScoredProduct, SearchMode, WebSearchHit, WebSearcher,
};
use crate::types::{ModelSettings, Timeouts};

/// Process-wide collaborators plus their deadlines.
#[derive(Clone)]
pub struct Services {
    pub model: Arc<dyn LanguageModel>,
    pub index: Arc<dyn ProductIndex>,
    pub web: Arc<dyn WebSearcher>,
    pub prompts: PromptCatalogue,
    pub settings: ModelSettings,
    pub timeouts: Timeouts,
}

impl Services {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        index: Arc<dyn ProductIndex>,
        web: Arc<dyn WebSearcher>,
    ) -> Self {
        Self {
            model,
            index,
            web,
            prompts: PromptCatalogue::new(),
            settings: ModelSettings::default(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptCatalogue) -> Self {
        self.prompts = prompts;
        self
    }

    /// Render a catalogue prompt.
    pub fn prompt(&self, name: &str, vars: &[(&str, &str)]) -> Result<RenderedPrompt, PromptError> {
        self.prompts.get(name, vars)
    }

    /// Run a rendered prompt through the model.
    pub async fn complete(
        &self,
        prompt: RenderedPrompt,
        history: &[ChatTurn],
        tune: impl FnOnce(GenerateRequest) -> GenerateRequest,
    ) -> Result<Completion, ModelError> {
        let request = GenerateRequest::new(prompt.name, prompt.system, prompt.user)
            .with_history(history.to_vec());
        self.generate(tune(request)).await
    }

    pub async fn generate(&self, request: GenerateRequest) -> Result<Completion, ModelError> {
        let deadline = self.timeouts.llm;
        tokio::time::timeout(deadline, self.model.generate(request))
            .await
            .map_err(|_| ModelError::Timeout(deadline))?
    }

    pub async fn search_products(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&Predicate>,
        mode: SearchMode,
    ) -> Result<Vec<ScoredProduct>, IndexError> {
        let deadline = self.timeouts.index;
        tokio::time::timeout(deadline, self.index.search_products(query, limit, filters, mode))
            .await
            .map_err(|_| IndexError::Timeout(deadline))?
    }

    pub async fn search_routes(&self, query: &str) -> Result<Vec<RouteHit>, IndexError> {
        let deadline = self.timeouts.index;
        tokio::time::timeout(deadline, self.index.search_routes(query))
            .await
            .map_err(|_| IndexError::Timeout(deadline))?
    }

    pub async fn store_raw_data(&self, product_id: &str, text: &str) -> Result<usize, IndexError> {
        let deadline = self.timeouts.index;
        tokio::time::timeout(deadline, self.index.store_raw_data(product_id, text))
            .await
            .map_err(|_| IndexError::Timeout(deadline))?
    }

    pub async fn get_relevant_chunks(
        &self,
        product_id: &str,
        probe: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>, IndexError> {
        let deadline = self.timeouts.index;
        tokio::time::timeout(deadline, self.index.get_relevant_chunks(product_id, probe, limit))
            .await
            .map_err(|_| IndexError::Timeout(deadline))?
    }

    pub async fn store_search_results(
        &self,
        product_id: &str,
        query: &str,
        content: &str,
        source: &str,
    ) -> Result<(), IndexError> {
        let deadline = self.timeouts.index;
        tokio::time::timeout(
            deadline,
            self.index.store_search_results(product_id, query, content, source),
        )
        .await
        .map_err(|_| IndexError::Timeout(deadline))?
    }

    pub async fn web_search(
        &self,
        query: &str,
        exclude_domains: &[String],
    ) -> Result<Vec<WebSearchHit>, SearchError> {
        let deadline = self.timeouts.web_search;
        tokio::time::timeout(deadline, self.web.search(query, exclude_domains))
            .await
            .map_err(|_| SearchError::Timeout(deadline))?
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("model", &self.model.name())
            .field("settings", &self.settings)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
