//! The terminal payload a planner run (or a terminal node) produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FinalAnswer {
    /// Preferred text key. Consumers should read this first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_answer: Option<String>,
    /// Structured payload when the answer isn't plain text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl FinalAnswer {
    pub fn text(raw_answer: impl Into<String>) -> Self {
        Self {
            raw_answer: Some(raw_answer.into()),
            ..Default::default()
        }
    }

    /// Read the text payload, tolerating the legacy key names
    /// (`answer`, `text`, `result`) a consumer's stored JSON might use.
    pub fn text_from_value(value: &Value) -> Option<String> {
        for key in ["raw_answer", "answer", "text", "result"] {
            if let Some(s) = value.get(key).and_then(Value::as_str) {
                return Some(s.to_string());
            }
        }
        None
    }
}
