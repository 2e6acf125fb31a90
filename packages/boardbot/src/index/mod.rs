//! Product index: predicates, chunking, route descriptors and the Weaviate client.

pub mod chunking;
pub mod predicate;
pub mod routes;
pub mod weaviate;

pub use chunking::{chunk_text, ChunkConfig};
pub use predicate::Predicate;
pub use routes::{seed_routes, RouteDescriptor};
pub use weaviate::WeaviateIndex;
