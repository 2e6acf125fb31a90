//! Language-model plumbing: the OpenAI adapter, token accounting and reply parsing.

pub mod json;
pub mod openai;
pub mod tokens;

pub use json::{parse_object, str_field};
pub use openai::{OpenAIModel, HISTORY_WINDOW};
pub use tokens::TokenCounter;
