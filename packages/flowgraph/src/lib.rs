//! # Flowgraph
//!
//! A small stateful graph executor. Nodes are async transformations
//! `(state, context) -> delta`; the executor merges each delta into the
//! running state and follows either an unconditional edge or the label a
//! router picks from the merged state.
//!
//! ## Key Invariants
//!
//! 1. **Deltas, not mutation** - nodes receive a snapshot and return a delta
//! 2. **Reducers own merging** - every state key declares how deltas combine
//! 3. **Sequential per run** - one node runs at a time within an invocation
//! 4. **Bounded** - a run stops after `3 × node_count` node invocations
//! 5. **Failures are data** - a node error becomes a state delta, never a panic
//!
//! ## Example
//!
//! ```ignore
//! use flowgraph::{GraphBuilder, GraphState, ErrorPolicy, Overwrite, END};
//!
//! #[derive(Debug, Clone, Default)]
//! struct Doc {
//!     text: Overwrite<String>,
//! }
//!
//! impl GraphState for Doc {
//!     fn merge(&mut self, delta: Self) {
//!         self.text.reduce(delta.text);
//!     }
//! }
//!
//! let graph = GraphBuilder::<Doc, ()>::new()
//!     .add_node("shout", |state: Doc, _ctx| async move {
//!         let text = state.text.get().cloned().unwrap_or_default();
//!         Ok(Doc { text: Overwrite::new(text.to_uppercase()) })
//!     })
//!     .add_edge("shout", END)
//!     .set_entry("shout")
//!     .compile()?;
//!
//! let run = graph.invoke(Doc::default(), Arc::new(())).await;
//! ```

pub mod error;
pub mod graph;
pub mod reducer;

pub use error::{GraphError, NodeError};
pub use graph::{
    CompiledGraph, ErrorPolicy, Execution, GraphBuilder, GraphState, Halt, NodeFuture, END,
};
pub use reducer::{Append, Counter, DictMerge, Overwrite, Reducer, Telemetry, UsageRow};
