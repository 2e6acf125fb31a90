//! Token accounting with the model's own BPE encoding.
//!
//! Encoders are resolved through `tiktoken-rs` and cached per model name.
//! Models it does not know are counted with `cl100k_base`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::debug;

use crate::error::ModelError;

/// Tokens added per chat message for role and separators.
const PER_MESSAGE_OVERHEAD: u32 = 3;
/// Tokens that prime the assistant reply.
const REPLY_PRIMING: u32 = 3;

static ENCODERS: LazyLock<RwLock<HashMap<String, TokenCounter>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Token counter used for request and reply accounting.
#[derive(Clone)]
pub struct TokenCounter {
    model: String,
    bpe: Arc<CoreBPE>,
}

impl fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCounter")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TokenCounter {
    /// Counter for `model`, built once per model name.
    pub fn for_model(model: &str) -> Result<Self, ModelError> {
        if let Some(counter) = ENCODERS
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
        {
            return Ok(counter.clone());
        }

        let bpe = match get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => {
                debug!(model, "no encoding registered for model, using cl100k_base");
                cl100k_base().map_err(|e| ModelError::Tokenizer(e.to_string()))?
            }
        };
        let counter = Self {
            model: model.to_string(),
            bpe: Arc::new(bpe),
        };
        ENCODERS
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), counter.clone());
        Ok(counter)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Tokens in a plain string.
    pub fn count(&self, text: &str) -> u32 {
        self.bpe.encode_with_special_tokens(text).len() as u32
    }

    /// Tokens for a full chat request: every message plus framing overhead.
    pub fn count_messages<'a>(&self, messages: impl IntoIterator<Item = (&'a str, &'a str)>) -> u32 {
        let body: u32 = messages
            .into_iter()
            .map(|(role, content)| PER_MESSAGE_OVERHEAD + self.count(role) + self.count(content))
            .sum();
        body + REPLY_PRIMING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_match_cl100k() {
        let counter = TokenCounter::for_model("gpt-4").unwrap();
        assert_eq!(counter.count("board"), 1);
        assert_eq!(counter.count("Hello, world!"), 4);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_unknown_model_falls_back_to_cl100k() {
        let counter = TokenCounter::for_model("boardbot-local-model").unwrap();
        assert_eq!(counter.model(), "boardbot-local-model");
        assert_eq!(counter.count("Hello, world!"), 4);
    }

    #[test]
    fn test_message_overhead() {
        let counter = TokenCounter::for_model("gpt-4").unwrap();
        let one = counter.count_messages([("user", "hi")]);
        assert_eq!(one, PER_MESSAGE_OVERHEAD + 1 + 1 + REPLY_PRIMING);
    }
}
