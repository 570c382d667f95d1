//! The tool catalog: the planner-facing projection of a graph's nodes,
//! derived from node identity plus whatever schemas the registry carries
//! for them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::Graph;
use crate::node::SideEffect;
use crate::registry::SchemaRegistry;

/// One planner-visible entry: everything a tool-selection prompt needs to
/// know about a node without touching its implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub node_id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    pub side_effects: SideEffect,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_hint_ms: Option<u64>,
}

/// Build the catalog for every node in `graph`, optionally filtered by a
/// tenant-scoped visibility predicate (e.g. hide `External`/`Stateful`
/// nodes from tenants without the relevant capability).
pub fn build_catalog(
    graph: &Graph,
    schemas: &[(String, Option<Value>, Option<Value>)],
    visible: impl Fn(&crate::node::Node) -> bool,
) -> Vec<CatalogEntry> {
    let schema_lookup: std::collections::HashMap<&str, (&Option<Value>, &Option<Value>)> = schemas
        .iter()
        .map(|(id, input, output)| (id.as_str(), (input, output)))
        .collect();

    graph
        .nodes()
        .filter(|node| visible(node))
        .map(|node| {
            let (input_schema, output_schema) = schema_lookup
                .get(node.node_id.as_str())
                .map(|(i, o)| ((*i).clone(), (*o).clone()))
                .unwrap_or((None, None));

            CatalogEntry {
                node_id: node.node_id.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                input_schema,
                output_schema,
                side_effects: node.side_effects,
                tags: node.tags.clone(),
                latency_hint_ms: node.latency_hint.map(|d| d.as_millis() as u64),
            }
        })
        .collect()
}

/// Whether `registry` has enough information (an input schema, at minimum)
/// to usefully describe `node_id` in a catalog entry.
pub fn is_describable(registry: &SchemaRegistry, node_id: &str) -> bool {
    registry.has_input_schema(node_id) || registry.has_output_schema(node_id)
}
