use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use boardbot::traits::DisabledWebSearcher;
use boardbot::{
    ModelSettings, OpenAIModel, RouterKind, SecretString, Services, TavilyWebSearcher, Timeouts,
    WeaviateIndex, WebSearcher,
};
use dotenvy::dotenv;
use openai_client::OpenAIClient;
use url::Url;

const DEFAULT_WEAVIATE_URL: &str = "http://localhost:8080";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<SecretString>,
    pub weaviate_url: Url,
    pub weaviate_api_key: Option<SecretString>,
    pub tavily_api_key: Option<SecretString>,
    pub model: ModelSettings,
    pub router_kind: RouterKind,
    pub timeouts: Timeouts,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str| var(key).map(SecretString::from);
        let defaults = ModelSettings::default();
        let default_timeouts = Timeouts::default();

        let weaviate_url = var("WEAVIATE_URL").unwrap_or_else(|| DEFAULT_WEAVIATE_URL.to_string());
        let weaviate_url = Url::parse(&weaviate_url).context("WEAVIATE_URL must be a valid URL")?;

        let model = ModelSettings {
            model: var("DEFAULT_MODEL").unwrap_or(defaults.model),
            max_tokens: parsed(&var, "DEFAULT_MAX_TOKENS", defaults.max_tokens)?,
            temperature: parsed(&var, "DEFAULT_TEMPERATURE", defaults.temperature)?,
            top_p: parsed(&var, "DEFAULT_TOP_P", defaults.top_p)?,
            seed: Some(parsed(&var, "RANDOM_SEED", defaults.seed.unwrap_or(1729))?),
        };

        let timeouts = Timeouts {
            llm: seconds(&var, "LLM_TIMEOUT_SECS", default_timeouts.llm)?,
            index: seconds(&var, "INDEX_TIMEOUT_SECS", default_timeouts.index)?,
            web_search: seconds(&var, "WEB_SEARCH_TIMEOUT_SECS", default_timeouts.web_search)?,
        };

        Ok(Self {
            openai_api_key: secret("OPENAI_API_KEY"),
            weaviate_url,
            weaviate_api_key: secret("WEAVIATE_API_KEY"),
            tavily_api_key: secret("TAVILY_API_KEY"),
            model,
            router_kind: parsed(&var, "ROUTER_KIND", RouterKind::default())?,
            timeouts,
        })
    }

    /// Collaborators for a real run: OpenAI, Weaviate and Tavily when a key
    /// is configured.
    pub fn services(&self) -> Result<Services> {
        let openai_key = self
            .openai_api_key
            .as_ref()
            .context("OPENAI_API_KEY must be set")?;

        let client = OpenAIClient::new(openai_key.expose()).with_timeout(self.timeouts.llm);
        let model = OpenAIModel::new(client).with_settings(self.model.clone());

        let mut index = WeaviateIndex::new(self.weaviate_url.as_str()).with_openai_key(openai_key.clone());
        if let Some(key) = &self.weaviate_api_key {
            index = index.with_api_key(key.clone());
        }

        let web: Arc<dyn WebSearcher> = match &self.tavily_api_key {
            Some(key) => Arc::new(TavilyWebSearcher::new(key.clone())),
            None => {
                tracing::warn!("TAVILY_API_KEY not set, web search disabled");
                Arc::new(DisabledWebSearcher)
            }
        };

        Ok(Services::new(Arc::new(model), Arc::new(index), web)
            .with_settings(self.model.clone())
            .with_timeouts(self.timeouts))
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}

fn seconds(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parsed(var, key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.weaviate_url.as_str(), "http://localhost:8080/");
        assert_eq!(config.model, ModelSettings::default());
        assert_eq!(config.router_kind, RouterKind::Hybrid);
        assert_eq!(config.timeouts, Timeouts::default());
        assert!(config.openai_api_key.is_none());
        assert!(config.services().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DEFAULT_MODEL", "gpt-4o"),
            ("DEFAULT_MAX_TOKENS", "1200"),
            ("RANDOM_SEED", "7"),
            ("ROUTER_KIND", "llm"),
            ("INDEX_TIMEOUT_SECS", "3"),
            ("TAVILY_API_KEY", "  "),
        ])
        .unwrap();
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.max_tokens, 1200);
        assert_eq!(config.model.seed, Some(7));
        assert_eq!(config.router_kind, RouterKind::Llm);
        assert_eq!(config.timeouts.index, Duration::from_secs(3));
        assert!(config.tavily_api_key.is_none());
    }

    #[test]
    fn test_invalid_number_names_the_key() {
        let error = config(&[("DEFAULT_TEMPERATURE", "warm")]).unwrap_err();
        assert!(error.to_string().contains("DEFAULT_TEMPERATURE"));

        let error = config(&[("ROUTER_KIND", "random")]).unwrap_err();
        assert!(error.to_string().contains("ROUTER_KIND"));
    }
}
