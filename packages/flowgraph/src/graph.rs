//! Graph construction and execution.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GraphError, NodeError};

/// Terminal sentinel. Route to `END` to finish a run.
pub const END: &str = "__end__";

/// Boxed future returned by a registered node.
pub type NodeFuture<S> = BoxFuture<'static, Result<S, NodeError>>;

type NodeFn<S, C> = Arc<dyn Fn(S, Arc<C>) -> NodeFuture<S> + Send + Sync>;
type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// State carried through a graph run.
///
/// `merge` applies each field's reducer. The two hooks turn node failures into
/// ordinary deltas so a run never has to unwind.
pub trait GraphState: Default + Clone + Send + Sync + 'static {
    /// Fold a node's delta into the running state.
    fn merge(&mut self, delta: Self);

    /// Delta recorded when `node` fails. Typically a zero-token telemetry row.
    fn failure_delta(_node: &str, _error: &NodeError, _elapsed: Duration) -> Self {
        Self::default()
    }

    /// Delta recorded when a failing node has no fallthrough and the run stops.
    fn abort_delta(_node: &str, _error: &NodeError) -> Self {
        Self::default()
    }
}

/// What the executor does after a node returns an error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the run after merging the failure and abort deltas.
    #[default]
    Abort,
    /// Merge the failure delta and follow the node's normal outgoing rule.
    Continue,
    /// Merge the failure delta and jump to the named node.
    Goto(String),
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// Reached `END`, or a router produced a label with no mapping.
    Terminal,
    /// Hit the `3 × node_count` invocation ceiling.
    StepLimit,
    /// The named node failed under [`ErrorPolicy::Abort`].
    Aborted(String),
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct Execution<S> {
    pub state: S,
    /// Node names in invocation order.
    pub visited: Vec<String>,
    pub halt: Halt,
}

impl<S> Execution<S> {
    pub fn steps(&self) -> usize {
        self.visited.len()
    }

    pub fn visits(&self, node: &str) -> usize {
        self.visited.iter().filter(|n| *n == node).count()
    }
}

enum Transition<S> {
    Direct(String),
    Conditional {
        router: RouterFn<S>,
        routes: IndexMap<String, String>,
    },
}

// =============================================================================
// Builder
// =============================================================================

/// Registers nodes, edges and routers, then compiles them into a [`CompiledGraph`].
pub struct GraphBuilder<S, C> {
    nodes: IndexMap<String, NodeFn<S, C>>,
    transitions: IndexMap<String, Vec<Transition<S>>>,
    policies: IndexMap<String, ErrorPolicy>,
    entry: Option<String>,
    errors: Vec<GraphError>,
}

impl<S: GraphState, C: Send + Sync + 'static> Default for GraphBuilder<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: GraphState, C: Send + Sync + 'static> GraphBuilder<S, C> {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            transitions: IndexMap::new(),
            policies: IndexMap::new(),
            entry: None,
            errors: Vec::new(),
        }
    }

    /// Register a node body. Duplicate names are reported by `compile()`.
    pub fn add_node<F, Fut>(mut self, name: impl Into<String>, node: F) -> Self
    where
        F: Fn(S, Arc<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S, NodeError>> + Send + 'static,
    {
        let name = name.into();
        if self.nodes.contains_key(&name) || name == END {
            self.errors.push(GraphError::DuplicateNode(name));
            return self;
        }
        let body: NodeFn<S, C> =
            Arc::new(move |state: S, ctx: Arc<C>| -> NodeFuture<S> { Box::pin(node(state, ctx)) });
        self.nodes.insert(name, body);
        self
    }

    /// Unconditional edge.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .push(Transition::Direct(to.into()));
        self
    }

    /// Router edge: after `from` completes, `router` inspects the merged state
    /// and returns a label that `routes` maps to the next node.
    pub fn add_conditional_edges<R, L, I, K, T>(
        mut self,
        from: impl Into<String>,
        router: R,
        routes: I,
    ) -> Self
    where
        R: Fn(&S) -> L + Send + Sync + 'static,
        L: Into<String>,
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<String>,
    {
        let router: RouterFn<S> = Arc::new(move |state: &S| -> String { router(state).into() });
        let routes = routes
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.transitions
            .entry(from.into())
            .or_default()
            .push(Transition::Conditional { router, routes });
        self
    }

    /// Failure handling for one node. Nodes default to [`ErrorPolicy::Abort`].
    pub fn on_error(mut self, node: impl Into<String>, policy: ErrorPolicy) -> Self {
        self.policies.insert(node.into(), policy);
        self
    }

    pub fn set_entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    /// Validate the wiring and freeze it.
    pub fn compile(mut self) -> Result<CompiledGraph<S, C>, GraphError> {
        if let Some(error) = self.errors.drain(..).next() {
            return Err(error);
        }

        let entry = self.entry.take().ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownNode(entry));
        }

        let known = |name: &str| name == END || self.nodes.contains_key(name);

        for from in self.transitions.keys() {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::UnknownNode(from.clone()));
            }
        }

        let mut edges = IndexMap::new();
        for name in self.nodes.keys() {
            let mut rules = self.transitions.swap_remove(name).unwrap_or_default();
            if rules.len() != 1 {
                return Err(GraphError::InvalidEdge {
                    from: name.clone(),
                    reason: format!("expected exactly one outgoing rule, found {}", rules.len()),
                });
            }
            let rule = rules.remove(0);
            match &rule {
                Transition::Direct(to) if !known(to) => {
                    return Err(GraphError::UnknownNode(to.clone()));
                }
                Transition::Conditional { routes, .. } => {
                    if routes.is_empty() {
                        return Err(GraphError::InvalidEdge {
                            from: name.clone(),
                            reason: "router has no routes".into(),
                        });
                    }
                    if let Some(target) = routes.values().find(|t| !known(t)) {
                        return Err(GraphError::UnknownNode(target.clone()));
                    }
                }
                Transition::Direct(_) => {}
            }
            edges.insert(name.clone(), rule);
        }

        for (node, policy) in &self.policies {
            if !self.nodes.contains_key(node) {
                return Err(GraphError::UnknownNode(node.clone()));
            }
            if let ErrorPolicy::Goto(target) = policy {
                if !known(target) {
                    return Err(GraphError::UnknownNode(target.clone()));
                }
            }
        }

        Ok(CompiledGraph {
            max_steps: 3 * self.nodes.len(),
            nodes: self.nodes,
            edges,
            policies: self.policies,
            entry,
        })
    }
}

// =============================================================================
// Compiled graph
// =============================================================================

/// An immutable, validated graph. Cheap to share behind an `Arc` and safe to
/// invoke concurrently; each invocation owns its state.
pub struct CompiledGraph<S, C> {
    nodes: IndexMap<String, NodeFn<S, C>>,
    edges: IndexMap<String, Transition<S>>,
    policies: IndexMap<String, ErrorPolicy>,
    entry: String,
    max_steps: usize,
}

impl<S: GraphState, C: Send + Sync + 'static> CompiledGraph<S, C> {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Invocation ceiling for one run.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Run from the entry node until `END`, the step ceiling or an abort.
    pub async fn invoke(&self, mut state: S, ctx: Arc<C>) -> Execution<S> {
        let run_start = Instant::now();
        let mut visited = Vec::new();
        let mut current = self.entry.clone();

        let halt = loop {
            if current == END {
                break Halt::Terminal;
            }
            if visited.len() >= self.max_steps {
                warn!(
                    node = %current,
                    max_steps = self.max_steps,
                    "step ceiling reached, stopping run"
                );
                break Halt::StepLimit;
            }
            let Some(body) = self.nodes.get(&current) else {
                // compile() guarantees every reachable name is registered
                break Halt::Terminal;
            };

            visited.push(current.clone());
            let started = Instant::now();
            let outcome = body(state.clone(), ctx.clone()).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(delta) => {
                    state.merge(delta);
                    debug!(node = %current, elapsed_ms = elapsed.as_millis(), "node completed");
                }
                Err(error) => {
                    state.merge(S::failure_delta(&current, &error, elapsed));
                    let policy = self.policies.get(&current).cloned().unwrap_or_default();
                    warn!(
                        node = %current,
                        error = %error,
                        policy = ?policy,
                        elapsed_ms = elapsed.as_millis(),
                        "node failed"
                    );
                    match policy {
                        ErrorPolicy::Abort => {
                            state.merge(S::abort_delta(&current, &error));
                            break Halt::Aborted(current);
                        }
                        ErrorPolicy::Goto(target) => {
                            current = target;
                            continue;
                        }
                        ErrorPolicy::Continue => {}
                    }
                }
            }

            match self.next(&current, &state) {
                Some(next) => current = next,
                None => break Halt::Terminal,
            }
        };

        info!(
            steps = visited.len(),
            halt = ?halt,
            elapsed_ms = run_start.elapsed().as_millis(),
            "graph run finished"
        );

        Execution {
            state,
            visited,
            halt,
        }
    }

    /// Like [`invoke`](Self::invoke) but stops at the next suspension point
    /// once `cancel` fires. State from a cancelled run is discarded.
    pub async fn invoke_with_cancel(
        &self,
        state: S,
        ctx: Arc<C>,
        cancel: CancellationToken,
    ) -> Result<Execution<S>, GraphError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("graph run cancelled");
                Err(GraphError::Cancelled)
            }
            execution = self.invoke(state, ctx) => Ok(execution),
        }
    }

    fn next(&self, from: &str, state: &S) -> Option<String> {
        match self.edges.get(from)? {
            Transition::Direct(to) => Some(to.clone()),
            Transition::Conditional { router, routes } => {
                let label = router(state);
                match routes.get(&label) {
                    Some(target) => {
                        debug!(node = %from, label = %label, target = %target, "routed");
                        Some(target.clone())
                    }
                    None => {
                        warn!(node = %from, label = %label, "router returned unmapped label, ending run");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{Append, Reducer};

    #[derive(Debug, Clone, Default)]
    struct Trace {
        steps: Append<&'static str>,
    }

    impl GraphState for Trace {
        fn merge(&mut self, delta: Self) {
            self.steps.reduce(delta.steps);
        }
    }

    fn step(name: &'static str) -> impl Fn(Trace, Arc<()>) -> NodeFuture<Trace> {
        move |_state: Trace, _ctx: Arc<()>| -> NodeFuture<Trace> {
            Box::pin(async move { Ok(Trace { steps: Append::one(name) }) })
        }
    }

    #[test]
    fn test_compile_requires_entry() {
        let result = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_edge("a", END)
            .compile();
        assert!(matches!(result, Err(GraphError::MissingEntry)));
    }

    #[test]
    fn test_compile_rejects_unknown_target() {
        let result = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_edge("a", "b")
            .set_entry("a")
            .compile();
        assert_eq!(result.err(), Some(GraphError::UnknownNode("b".into())));
    }

    #[test]
    fn test_compile_rejects_duplicate_node() {
        let result = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_node("a", step("a"))
            .add_edge("a", END)
            .set_entry("a")
            .compile();
        assert_eq!(result.err(), Some(GraphError::DuplicateNode("a".into())));
    }

    #[test]
    fn test_compile_rejects_missing_and_double_rules() {
        let missing = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .set_entry("a")
            .compile();
        assert!(matches!(missing, Err(GraphError::InvalidEdge { .. })));

        let double = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_edge("a", END)
            .add_edge("a", END)
            .set_entry("a")
            .compile();
        assert!(matches!(double, Err(GraphError::InvalidEdge { .. })));
    }

    #[test]
    fn test_step_ceiling_is_three_per_node() {
        let graph = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_node("b", step("b"))
            .add_edge("a", "b")
            .add_edge("b", END)
            .set_entry("a")
            .compile()
            .unwrap();
        assert_eq!(graph.max_steps(), 6);
    }

    #[tokio::test]
    async fn test_linear_run() {
        let graph = GraphBuilder::<Trace, ()>::new()
            .add_node("a", step("a"))
            .add_node("b", step("b"))
            .add_edge("a", "b")
            .add_edge("b", END)
            .set_entry("a")
            .compile()
            .unwrap();

        let run = graph.invoke(Trace::default(), Arc::new(())).await;
        assert_eq!(run.halt, Halt::Terminal);
        assert_eq!(run.state.steps.as_slice(), &["a", "b"]);
        assert_eq!(run.visited, vec!["a", "b"]);
    }
}
