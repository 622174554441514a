//! Stateful workflow graph engine.
//!
//! A [`StateGraph`] is a registry of async node functions (`S -> S`) joined
//! by static edges, plus at most one conditional router per node. Build the
//! topology, [`StateGraph::compile`] it, then drive it with
//! [`CompiledGraph::invoke`]:
//!
//! ```rust,ignore
//! let mut graph = StateGraph::new();
//! graph.add_node_from_fn("double", |mut state: Counter| {
//!     Box::pin(async move {
//!         state.value *= 2;
//!         Ok(state)
//!     })
//! });
//! graph.set_entry_point("double");
//! graph.add_edge("double", END);
//! let app = graph.compile()?;
//! let result = app.invoke(Counter { value: 21 }).await?;
//! assert_eq!(result.final_state.value, 42);
//! ```
//!
//! Execution is strictly sequential: one node at a time, state threaded by
//! value, effects linearizable in execution order. Concurrency lives at the
//! conversation level - independent invocations share nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::core::error::{Error, Result};

/// Terminal pseudo-node. Routing here ends the run.
pub const END: &str = "__end__";

type NodeFn<S> = Arc<dyn Fn(S) -> BoxFuture<'static, Result<S>> + Send + Sync>;
type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Execution limits for a single run.
#[derive(Clone, Debug, Default)]
pub struct ExecutionConfig {
    /// Backstop on total node executions. `None` uses [`DEFAULT_STEP_LIMIT`].
    pub step_limit: Option<usize>,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<std::time::Duration>,
    /// Node to jump to (once) when the deadline expires. The jump happens at
    /// a step boundary; the target node's outgoing edges are then followed
    /// normally, so it should lead to [`END`].
    pub deadline_node: Option<String>,
}

/// Default backstop on node executions per run.
pub const DEFAULT_STEP_LIMIT: usize = 64;

impl ExecutionConfig {
    /// Override the step backstop.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Force a jump to `node` when `deadline` expires.
    #[must_use]
    pub fn with_deadline(mut self, deadline: std::time::Duration, node: impl Into<String>) -> Self {
        self.deadline = Some(deadline);
        self.deadline_node = Some(node.into());
        self
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct ExecutionResult<S> {
    /// State after the last node.
    pub final_state: S,
    /// Node ids in execution order.
    pub nodes_executed: Vec<String>,
}

/// A workflow graph under construction.
pub struct StateGraph<S> {
    nodes: HashMap<String, NodeFn<S>>,
    edges: HashMap<String, String>,
    conditional_edges: HashMap<String, (RouterFn<S>, HashMap<String, String>)>,
    entry_point: Option<String>,
}

impl<S> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            conditional_edges: HashMap::new(),
            entry_point: None,
        }
    }

    /// Register a node function. Re-registering an id replaces the function.
    pub fn add_node_from_fn<F>(&mut self, id: impl Into<String>, f: F)
    where
        F: Fn(S) -> BoxFuture<'static, Result<S>> + Send + Sync + 'static,
    {
        self.nodes.insert(id.into(), Arc::new(f));
    }

    /// Add a static edge.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.insert(from.into(), to.into());
    }

    /// Add a conditional edge: `router` maps the state to a key looked up in
    /// `routes`.
    pub fn add_conditional_edges<F>(
        &mut self,
        from: impl Into<String>,
        router: F,
        routes: HashMap<String, String>,
    ) where
        F: Fn(&S) -> String + Send + Sync + 'static,
    {
        self.conditional_edges
            .insert(from.into(), (Arc::new(router), routes));
    }

    /// Set the node execution starts from.
    pub fn set_entry_point(&mut self, id: impl Into<String>) {
        self.entry_point = Some(id.into());
    }

    /// Validate the topology and produce an executable graph.
    pub fn compile(self) -> Result<CompiledGraph<S>> {
        let entry_point = self
            .entry_point
            .ok_or_else(|| Error::GraphConfig("no entry point set".to_string()))?;
        if !self.nodes.contains_key(&entry_point) {
            return Err(Error::GraphConfig(format!(
                "entry point '{entry_point}' is not a registered node"
            )));
        }
        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::GraphConfig(format!(
                    "edge source '{from}' is not a registered node"
                )));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(Error::GraphConfig(format!(
                    "edge target '{to}' is not a registered node"
                )));
            }
        }
        for (from, (_, routes)) in &self.conditional_edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::GraphConfig(format!(
                    "conditional edge source '{from}' is not a registered node"
                )));
            }
            for to in routes.values() {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(Error::GraphConfig(format!(
                        "conditional route target '{to}' is not a registered node"
                    )));
                }
            }
        }
        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
            entry_point,
        })
    }
}

/// An executable workflow graph.
pub struct CompiledGraph<S> {
    nodes: HashMap<String, NodeFn<S>>,
    edges: HashMap<String, String>,
    conditional_edges: HashMap<String, (RouterFn<S>, HashMap<String, String>)>,
    entry_point: String,
}

impl<S: Send + 'static> CompiledGraph<S> {
    /// Run the graph with default limits.
    pub async fn invoke(&self, state: S) -> Result<ExecutionResult<S>> {
        self.invoke_with_config(state, ExecutionConfig::default())
            .await
    }

    /// Run the graph under the given limits.
    pub async fn invoke_with_config(
        &self,
        state: S,
        config: ExecutionConfig,
    ) -> Result<ExecutionResult<S>> {
        let step_limit = config.step_limit.unwrap_or(DEFAULT_STEP_LIMIT);
        let started = Instant::now();
        let mut deadline_fired = false;

        let mut current = self.entry_point.clone();
        let mut state = state;
        let mut nodes_executed = Vec::new();

        while current != END {
            if nodes_executed.len() >= step_limit {
                return Err(Error::StepLimitExceeded(step_limit));
            }
            if !deadline_fired {
                if let (Some(deadline), Some(node)) = (config.deadline, &config.deadline_node) {
                    if started.elapsed() >= deadline && current != *node {
                        warn!(from = %current, to = %node, "deadline expired, jumping");
                        current = node.clone();
                        deadline_fired = true;
                        continue;
                    }
                }
            }

            let node_fn = self.nodes.get(&current).ok_or_else(|| {
                Error::GraphConfig(format!("node '{current}' is not registered"))
            })?;
            debug!(node = %current, step = nodes_executed.len(), "executing node");
            state = node_fn(state)
                .await
                .map_err(|e| Error::node(current.clone(), e))?;
            nodes_executed.push(current.clone());

            current = if let Some((router, routes)) = self.conditional_edges.get(&current) {
                let key = router(&state);
                routes.get(&key).cloned().ok_or_else(|| {
                    Error::GraphConfig(format!("no route for key '{key}' out of '{current}'"))
                })?
            } else if let Some(next) = self.edges.get(&current) {
                next.clone()
            } else {
                return Err(Error::GraphConfig(format!(
                    "node '{current}' has no outgoing edge"
                )));
            };
        }

        Ok(ExecutionResult {
            final_state: state,
            nodes_executed,
        })
    }
}
