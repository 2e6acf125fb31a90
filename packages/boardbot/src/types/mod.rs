//! Domain types shared by both pipelines.

pub mod catalogue;
pub mod config;
pub mod query;
pub mod route;

pub use catalogue::{is_not_available, Attribute, FeatureValue, Product, ValueType, NOT_AVAILABLE};
pub use config::{ExtractionConfig, ExtractorKind, ModelSettings, PipelineConfig, RouterKind, Timeouts};
pub use query::{FilterValue, QueryContext, SortOrder, SortSpec, DEFAULT_PRODUCT_COUNT};
pub use route::{Category, Classification};
