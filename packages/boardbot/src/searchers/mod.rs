//! Web search providers.

pub mod tavily;

pub use tavily::TavilyWebSearcher;
