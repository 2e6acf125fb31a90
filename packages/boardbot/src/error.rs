//! Typed errors for the assistant library.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Collaborator failures
//! (model, index, web search) are recovered inside graph nodes; only
//! [`ValidationError`] and [`PromptError`] are programmer errors that reach
//! the request boundary.

use std::time::Duration;

use thiserror::Error;

/// Errors from the language-model collaborator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Deadline expired before the completion arrived
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The chat-completion client failed
    #[error("model client error: {0}")]
    Client(#[from] openai_client::OpenAIError),

    /// No BPE encoding could be loaded for token accounting
    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),

    /// Model unavailable for any other reason
    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the product index collaborator.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Deadline expired before the index answered
    #[error("index call timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport failed
    #[error("index HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("index API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The query was rejected (GraphQL errors, bad class, etc.)
    #[error("index query failed: {0}")]
    Query(String),

    /// Response body did not have the expected shape
    #[error("index response decode failed: {0}")]
    Decode(String),
}

/// Errors from the web-search collaborator.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Deadline expired before the search answered
    #[error("web search timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport failed
    #[error("web search HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("web search API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No provider configured
    #[error("web search is not configured")]
    Disabled,
}

/// Prompt catalogue misuse. Always a programmer error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("prompt '{prompt}' is missing variables: {missing:?}")]
    MissingVariables { prompt: String, missing: Vec<String> },

    #[error("prompt '{prompt}' got unexpected variables: {unexpected:?}")]
    UnexpectedVariables {
        prompt: String,
        unexpected: Vec<String>,
    },

    #[error("prompt '{prompt}' template is malformed: {reason}")]
    Template { prompt: String, reason: String },
}

/// Filter clause could not be translated into an index predicate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown filter attribute: {0}")]
    UnknownAttribute(String),

    #[error("cannot parse comparison '{value}' for {attribute}")]
    UnparseableComparison { attribute: String, value: String },
}

/// Bad input at the request boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("unknown router kind: {0}")]
    UnknownRouter(String),

    #[error("unknown extractor kind: {0}")]
    UnknownExtractor(String),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("product id is empty")]
    EmptyProductId,

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Top-level error for library operations.
#[derive(Debug, Error)]
pub enum BoardbotError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("graph error: {0}")]
    Graph(#[from] flowgraph::GraphError),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, BoardbotError>;
