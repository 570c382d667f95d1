//! Working memory: the domain-agnostic record cyclic controller nodes use
//! to accumulate evidence and track budget consumption.
//!
//! The runtime treats working memory as an opaque JSON payload like any
//! other — it never inspects `hops`/`budget_*` itself. The planner crate is
//! the one consumer that reads these fields to enforce budgets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single piece of accumulated evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub source: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    pub query: String,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub hops: u32,
    pub budget_hops: u32,
    pub budget_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub confidence: f32,
}

impl WorkingMemory {
    pub fn new(query: impl Into<String>, budget_hops: u32, budget_tokens: u64) -> Self {
        Self {
            query: query.into(),
            facts: Vec::new(),
            hops: 0,
            budget_hops,
            budget_tokens,
            deadline: None,
            confidence: 0.0,
        }
    }

    pub fn record_fact(&mut self, source: impl Into<String>, content: Value) {
        self.facts.push(Fact {
            source: source.into(),
            content,
        });
    }

    pub fn advance_hop(&mut self) {
        self.hops += 1;
    }

    pub fn hops_exhausted(&self) -> bool {
        self.hops >= self.budget_hops
    }

    pub fn deadline_elapsed(&self) -> bool {
        self.deadline.map(|d| chrono::Utc::now() >= d).unwrap_or(false)
    }
}
