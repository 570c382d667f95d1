//! The schema registry: per-node input/output JSON Schemas, compiled once
//! and cached, with field-path-qualified validation errors.

use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GraphError, Result, ValidationDirection};
use crate::node::NodeId;

/// A compiled schema pair for one node. Compilation happens once, at
/// registration time, so the hot path only ever runs validation.
///
/// `input_properties` is kept alongside the compiled input schema (rather
/// than discarding the raw `Value` after compilation) so callers can ask
/// "does this node's input schema mention field X" without re-parsing the
/// schema themselves — the planner's join auto-injection uses this to
/// decide which bookkeeping fields a join node actually wants.
struct CompiledPair {
    input: Option<JSONSchema>,
    output: Option<JSONSchema>,
    input_properties: Option<Vec<String>>,
}

/// Extract the top-level `properties` key names from an object schema, if
/// it has one. Schemas with no `properties` (or that aren't object
/// schemas) yield `None`, meaning "unknown" rather than "empty".
fn property_names(schema: &Value) -> Option<Vec<String>> {
    schema
        .get("properties")?
        .as_object()
        .map(|props| props.keys().cloned().collect())
}

/// Maps node ids to their compiled input/output schemas.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    compiled: Arc<HashMap<NodeId, CompiledPairHandle>>,
}

type CompiledPairHandle = Arc<CompiledPair>;

/// Builder used while assembling a registry; not `Send`-shared until
/// [`SchemaRegistryBuilder::build`] freezes it.
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    raw: HashMap<NodeId, (Option<Value>, Option<Value>)>,
}

impl SchemaRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas(
        mut self,
        node_id: impl Into<String>,
        input_schema: Option<Value>,
        output_schema: Option<Value>,
    ) -> Self {
        self.raw.insert(node_id.into(), (input_schema, output_schema));
        self
    }

    /// Compile every registered schema, failing fast if any is malformed.
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut compiled = HashMap::new();
        for (node_id, (input, output)) in self.raw {
            let input_properties = input.as_ref().and_then(property_names);
            let input = input
                .map(|schema| compile(&node_id, ValidationDirection::Input, &schema))
                .transpose()?;
            let output = output
                .map(|schema| compile(&node_id, ValidationDirection::Output, &schema))
                .transpose()?;
            compiled.insert(
                node_id,
                Arc::new(CompiledPair {
                    input,
                    output,
                    input_properties,
                }),
            );
        }
        Ok(SchemaRegistry {
            compiled: Arc::new(compiled),
        })
    }
}

fn compile(node_id: &str, direction: ValidationDirection, schema: &Value) -> Result<JSONSchema> {
    JSONSchema::compile(schema).map_err(|e| GraphError::Validation {
        node: node_id.to_string(),
        direction,
        error: format!("malformed schema: {e}"),
    })
}

impl SchemaRegistry {
    /// Validate `value` against `node_id`'s schema for `direction`. Absent a
    /// registered schema for that node/direction, validation passes
    /// trivially — schemas are opt-in per node.
    pub fn validate(&self, node_id: &str, direction: ValidationDirection, value: &Value) -> Result<()> {
        let Some(pair) = self.compiled.get(node_id) else {
            return Ok(());
        };
        let schema = match direction {
            ValidationDirection::Input => &pair.input,
            ValidationDirection::Output => &pair.output,
        };
        let Some(schema) = schema else {
            return Ok(());
        };
        let result = schema.validate(value);
        if let Err(errors) = result {
            let detail = errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GraphError::Validation {
                node: node_id.to_string(),
                direction,
                error: detail,
            });
        }
        Ok(())
    }

    pub fn has_input_schema(&self, node_id: &str) -> bool {
        self.compiled
            .get(node_id)
            .map(|p| p.input.is_some())
            .unwrap_or(false)
    }

    pub fn has_output_schema(&self, node_id: &str) -> bool {
        self.compiled
            .get(node_id)
            .map(|p| p.output.is_some())
            .unwrap_or(false)
    }

    /// Whether `node_id` has a registered input schema that declares
    /// `field` among its top-level `properties`. A node with no input
    /// schema at all (or one with no `properties`) answers `true` for
    /// every field — callers treat "no schema" as "no opinion", not "wants
    /// nothing".
    pub fn input_wants_field(&self, node_id: &str, field: &str) -> bool {
        match self.compiled.get(node_id).and_then(|p| p.input_properties.as_ref()) {
            Some(properties) => properties.iter().any(|p| p == field),
            None => true,
        }
    }
}
