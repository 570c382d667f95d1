//! Graph topology: nodes, directed floe edges, and the construction-time
//! checks that must pass before a [`crate::runtime::Runtime`] can spawn
//! workers for it.
//!
//! Cycles are rejected by default — this runtime requires every node to
//! opt in to being part of a cycle via [`crate::node::Node::allow_cycle`]
//! (spec §9 REDESIGN FLAG: explicit opt-in beats a global "allow cycles"
//! switch because it scopes the footgun to the node that actually loops).

use std::collections::{HashMap, HashSet};

use crate::error::{GraphError, Result};
use crate::node::{Node, NodeId};

pub const INGRESS: &str = "__ingress__";
pub const EGRESS: &str = "__egress__";

/// An edge declaration: `from` may emit to `to`, with a queue capacity for
/// the floe backing it.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub from: NodeId,
    pub to: NodeId,
    pub capacity: usize,
}

/// The static topology: node definitions plus the directed edges between
/// them. Built incrementally with [`GraphBuilder`], then validated and
/// frozen into a [`Graph`].
#[derive(Clone)]
pub struct Graph {
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) edges: Vec<EdgeSpec>,
    pub(crate) entry: Vec<NodeId>,
    pub(crate) error_sink: Option<NodeId>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The node, if any, that terminal node errors are routed to instead
    /// of ending the trace (spec §4.1 failure semantics).
    pub fn error_sink(&self) -> Option<&str> {
        self.error_sink.as_deref()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn successors_of(&self, id: &str) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.clone())
            .collect()
    }

    pub fn predecessors_of(&self, id: &str) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from.clone())
            .collect()
    }

    pub fn entry_nodes(&self) -> &[NodeId] {
        &self.entry
    }
}

/// Incrementally assembles a [`Graph`], deferring all validation to
/// [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<NodeId, Node>,
    edges: Vec<EdgeSpec>,
    entry: Vec<NodeId>,
    error_sink: Option<NodeId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: Node) -> Result<Self> {
        if self.nodes.contains_key(&node.node_id) {
            return Err(GraphError::topology(format!(
                "duplicate node id '{}'",
                node.node_id
            )));
        }
        self.nodes.insert(node.node_id.clone(), node);
        Ok(self)
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>, capacity: usize) -> Self {
        self.edges.push(EdgeSpec {
            from: from.into(),
            to: to.into(),
            capacity,
        });
        self
    }

    pub fn with_entry(mut self, node_id: impl Into<String>) -> Self {
        self.entry.push(node_id.into());
        self
    }

    /// Route terminal node errors (retries exhausted) to this node instead
    /// of ending the trace. Validated at `build()` time like any other
    /// node reference.
    pub fn with_error_sink(mut self, node_id: impl Into<String>) -> Self {
        self.error_sink = Some(node_id.into());
        self
    }

    /// Validate and freeze the topology:
    /// - every edge endpoint refers to a declared node,
    /// - every declared entry node exists,
    /// - the graph is acyclic unless every node on a cycle has
    ///   `allow_cycle` set,
    /// - every node is reachable from some entry node and can reach egress
    ///   (an explicit `EGRESS`/`INGRESS` sentinel edge, or simply "has no
    ///   successors", counts as reaching egress).
    pub fn build(self) -> Result<Graph> {
        if self.entry.is_empty() {
            return Err(GraphError::topology("graph has no entry node"));
        }
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                return Err(GraphError::topology(format!(
                    "edge references unknown source node '{}'",
                    edge.from
                )));
            }
            if !self.nodes.contains_key(&edge.to) {
                return Err(GraphError::topology(format!(
                    "edge references unknown target node '{}'",
                    edge.to
                )));
            }
        }
        for entry in &self.entry {
            if !self.nodes.contains_key(entry) {
                return Err(GraphError::topology(format!(
                    "entry node '{entry}' is not declared"
                )));
            }
        }
        if let Some(sink) = &self.error_sink {
            if !self.nodes.contains_key(sink) {
                return Err(GraphError::topology(format!(
                    "error sink node '{sink}' is not declared"
                )));
            }
        }

        check_cycles(&self.nodes, &self.edges)?;
        // The error sink is wired as its own extra producer (like ingress)
        // at runtime spawn time, so it counts as a root for reachability
        // even though no in-graph edge points to it.
        let mut roots = self.entry.clone();
        roots.extend(self.error_sink.clone());
        check_reachability(&self.nodes, &self.edges, &roots)?;
        check_can_reach_egress(&self.nodes, &self.edges)?;

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry: self.entry,
            error_sink: self.error_sink,
        })
    }
}

/// Three-color DFS cycle detection. A back-edge from `v` to a gray
/// ancestor `w` means the path `w -> ... -> v -> w` on the DFS stack is a
/// cycle; every node on that path must have `allow_cycle` set or the
/// whole graph is rejected.
fn check_cycles(nodes: &HashMap<NodeId, Node>, edges: &[EdgeSpec]) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }

    #[derive(PartialEq, Eq, Clone, Copy)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> = nodes.keys().map(|id| (id.as_str(), Color::White)).collect();
    let mut path: Vec<&str> = Vec::new();

    fn visit<'a>(
        v: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        color: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
        nodes: &HashMap<NodeId, Node>,
    ) -> Result<()> {
        color.insert(v, Color::Gray);
        path.push(v);

        if let Some(successors) = adjacency.get(v) {
            for &w in successors {
                match color.get(w).copied().unwrap_or(Color::White) {
                    Color::White => visit(w, adjacency, color, path, nodes)?,
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == w).unwrap_or(0);
                        for &member in &path[start..] {
                            let allows = nodes.get(member).map(|n| n.allow_cycle).unwrap_or(false);
                            if !allows {
                                return Err(GraphError::topology(format!(
                                    "cycle detected through node '{member}' without allow_cycle"
                                )));
                            }
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        path.pop();
        color.insert(v, Color::Black);
        Ok(())
    }

    let all_ids: Vec<&str> = nodes.keys().map(|s| s.as_str()).collect();
    for node_id in all_ids {
        if color.get(node_id).copied().unwrap_or(Color::White) == Color::White {
            visit(node_id, &adjacency, &mut color, &mut path, nodes)?;
        }
    }

    Ok(())
}

/// A node with no declared successors is wired straight to the synthetic
/// egress floe at runtime-spawn time (`runtime.rs`'s "no declared
/// successors: wire straight to egress"), so egress-qualifying nodes are
/// exactly the zero-out-degree ones. A node can reach egress if a forward
/// path leads to one of those; computed here as a backward BFS from the
/// egress set along reversed edges.
fn check_can_reach_egress(nodes: &HashMap<NodeId, Node>, edges: &[EdgeSpec]) -> Result<()> {
    let has_successor: HashSet<&str> = edges.iter().map(|e| e.from.as_str()).collect();
    let egress_nodes: Vec<&str> = nodes
        .keys()
        .map(|id| id.as_str())
        .filter(|id| !has_successor.contains(id))
        .collect();

    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        reverse.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
    }

    let mut can_reach_egress: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = egress_nodes;
    while let Some(current) = queue.pop() {
        if !can_reach_egress.insert(current) {
            continue;
        }
        if let Some(preds) = reverse.get(current) {
            queue.extend(preds.iter());
        }
    }

    for node_id in nodes.keys() {
        if !can_reach_egress.contains(node_id.as_str()) {
            return Err(GraphError::topology(format!(
                "node '{node_id}' has no path to egress (no reachable zero-successor node)"
            )));
        }
    }

    Ok(())
}

fn check_reachability(
    nodes: &HashMap<NodeId, Node>,
    edges: &[EdgeSpec],
    entry: &[NodeId],
) -> Result<()> {
    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        forward.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: Vec<&str> = entry.iter().map(|s| s.as_str()).collect();
    while let Some(current) = queue.pop() {
        if !reachable.insert(current) {
            continue;
        }
        if let Some(succ) = forward.get(current) {
            queue.extend(succ.iter());
        }
    }

    for node_id in nodes.keys() {
        if !reachable.contains(node_id.as_str()) {
            return Err(GraphError::topology(format!(
                "node '{node_id}' is unreachable from any entry node"
            )));
        }
    }

    Ok(())
}
