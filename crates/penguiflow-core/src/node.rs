//! Node definitions: identity, flags, and the async implementation
//! function a worker drives.

use crate::context::Context;
use crate::emission::Emission;
use crate::error::Result;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Stable identifier for a node, distinct from its human-readable `name`.
/// Node ids are assigned at construction and never reused within a graph.
pub type NodeId = String;

/// Future returned by a node's implementation function.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<Emission>> + Send>>;

/// The async function a node executes: given the validated input payload
/// and a [`Context`] handle, produce an [`Emission`].
pub type NodeFn = Arc<dyn Fn(Value, Context) -> NodeFuture + Send + Sync>;

/// Declared side-effect class of a node. Used by planner tool-filtering
/// policy (hide `External`/`Stateful` nodes from certain tenants) and by
/// the parallel-groups planning hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Pure,
    Read,
    Write,
    External,
    Stateful,
}

/// A node definition: identity, policy, implementation, and flags.
#[derive(Clone)]
pub struct Node {
    pub node_id: NodeId,
    pub name: String,
    /// Human-readable description surfaced to planner tool-selection
    /// prompts via the catalog; empty by default.
    pub description: String,
    pub policy: Policy,
    pub handler: NodeFn,
    /// Exempts this node from the graph's acyclicity check.
    pub allow_cycle: bool,
    pub side_effects: SideEffect,
    pub tags: Vec<String>,
    pub latency_hint: Option<std::time::Duration>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("policy", &self.policy)
            .field("allow_cycle", &self.allow_cycle)
            .field("side_effects", &self.side_effects)
            .field("tags", &self.tags)
            .field("latency_hint", &self.latency_hint)
            .finish()
    }
}

impl Node {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>, handler: NodeFn) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            description: String::new(),
            policy: Policy::default(),
            handler,
            allow_cycle: false,
            side_effects: SideEffect::Pure,
            tags: Vec::new(),
            latency_hint: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn allow_cycle(mut self) -> Self {
        self.allow_cycle = true;
        self
    }

    pub fn with_side_effects(mut self, side_effects: SideEffect) -> Self {
        self.side_effects = side_effects;
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_latency_hint(mut self, hint: std::time::Duration) -> Self {
        self.latency_hint = Some(hint);
        self
    }
}
