//! Error types for graph construction and node execution.

use std::fmt;

use thiserror::Error;

/// Errors raised while building or running a graph.
///
/// Node failures are not represented here: they are folded into state by the
/// executor according to the node's [`ErrorPolicy`](crate::ErrorPolicy).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An edge, router target or error target names a node that was never added
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// `compile()` was called without `set_entry()`
    #[error("graph has no entry node")]
    MissingEntry,

    /// The same node name was registered twice
    #[error("node registered twice: {0}")]
    DuplicateNode(String),

    /// A node has zero or several outgoing rules, or a rule is malformed
    #[error("invalid edge from '{from}': {reason}")]
    InvalidEdge { from: String, reason: String },

    /// The run was cancelled before reaching a terminal state
    #[error("graph execution cancelled")]
    Cancelled,
}

/// A failure returned by a node body.
///
/// Any `std::error::Error` converts into a `NodeError` so node bodies can use
/// `?` freely. Like `anyhow::Error`, this type deliberately does not implement
/// `std::error::Error` itself.
pub struct NodeError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl NodeError {
    /// Build an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
            source: None,
        }
    }

    /// The underlying error, if the node failed on a typed error.
    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Downcast the underlying error.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl<E> From<E> for NodeError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeError")
            .field("message", &self.message)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("index offline")]
    struct Offline;

    fn lookup() -> Result<u32, Offline> {
        Err(Offline)
    }

    fn fails() -> Result<u32, NodeError> {
        let hits = lookup()?;
        Ok(hits)
    }

    #[test]
    fn test_question_mark_converts_errors() {
        let err = fails().unwrap_err();
        assert_eq!(err.to_string(), "index offline");
        assert!(err.downcast_ref::<Offline>().is_some());
    }

    #[test]
    fn test_plain_message() {
        let err = NodeError::msg("no reply");
        assert_eq!(err.to_string(), "no reply");
        assert!(err.source().is_none());
    }
}
