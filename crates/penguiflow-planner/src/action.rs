//! The planner's action schema: what the LLM is asked to produce on every
//! iteration, plus lenient extraction of that schema from raw LLM text.
//!
//! Three mutually exclusive shapes, matched in this order against the
//! repaired JSON object's keys:
//! - **Sequential** — `{thought, next_node, args}`
//! - **Parallel** — `{thought, plan:[{node, args}…], join?:{node}}`
//! - **Finish** — `{thought, final:{raw_answer, sources?, confidence?, artifacts?}}`

pub mod repair;

use penguiflow_core::FinalAnswer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    pub node: String,
    #[serde(default = "default_args")]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinSpec {
    pub node: String,
}

fn default_args() -> Value {
    Value::Object(serde_json::Map::new())
}

/// The next step the LLM asked the planner to take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Finish {
        thought: String,
        #[serde(rename = "final")]
        final_answer: FinalAnswer,
    },
    Parallel {
        thought: String,
        plan: Vec<PlanItem>,
        #[serde(default)]
        join: Option<JoinSpec>,
    },
    Sequential {
        thought: String,
        next_node: String,
        #[serde(default = "default_args")]
        args: Value,
    },
}

impl Action {
    pub fn thought(&self) -> &str {
        match self {
            Action::Sequential { thought, .. } => thought,
            Action::Parallel { thought, .. } => thought,
            Action::Finish { thought, .. } => thought,
        }
    }

    /// Every node id this action references, for catalog-membership
    /// validation before execution.
    pub fn referenced_nodes(&self) -> Vec<&str> {
        match self {
            Action::Sequential { next_node, .. } => vec![next_node.as_str()],
            Action::Parallel { plan, join, .. } => {
                let mut nodes: Vec<&str> = plan.iter().map(|item| item.node.as_str()).collect();
                if let Some(join) = join {
                    nodes.push(join.node.as_str());
                }
                nodes
            }
            Action::Finish { .. } => Vec::new(),
        }
    }

    /// Parse an `Action` out of an already-valid JSON value. `serde`'s
    /// `untagged` matching tries variants top-to-bottom, so the field-set
    /// precedence above (`final` before `plan` before `next_node`) is what
    /// decides ambiguous-looking payloads — a response that carries both a
    /// `final` key and stray `next_node` noise from a prior turn still
    /// resolves to `Finish`.
    pub fn from_value(value: Value) -> Result<Action, String> {
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}
