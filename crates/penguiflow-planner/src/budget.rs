//! Budgets (hops, deadline, tokens) and planning hints (advisory
//! parallelism constraints enforced by the validator, never by the LLM).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use penguiflow_core::{CatalogEntry, Headers};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::action::PlanItem;

/// Why a run terminated on a budget check rather than an LLM decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetExhausted {
    Hops,
    Deadline,
    Tokens,
}

#[derive(Debug, Clone)]
pub struct Budgets {
    pub max_iters: u32,
    pub hop_budget: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub token_budget: u64,
}

impl Budgets {
    pub fn new(max_iters: u32, hop_budget: u32, token_budget: u64) -> Self {
        Self {
            max_iters,
            hop_budget,
            deadline: None,
            token_budget,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Checked before every LLM call, per spec §4.10. `hops` and `tokens`
    /// are checked against this call's going-in state; callers additionally
    /// re-check tokens after estimating what the *next* call would add.
    pub fn check(&self, hops: u32) -> Option<BudgetExhausted> {
        if hops >= self.max_iters || hops >= self.hop_budget {
            return Some(BudgetExhausted::Hops);
        }
        if let Some(deadline) = self.deadline {
            if Utc::now() >= deadline {
                return Some(BudgetExhausted::Deadline);
            }
        }
        None
    }

    pub fn tokens_exceeded(&self, estimated_next: u64) -> bool {
        estimated_next > self.token_budget
    }
}

/// Advisory parallelism constraints, surfaced in the planning prompt and
/// enforced by the plan validator — never left to the LLM to self-police.
#[derive(Debug, Clone, Default)]
pub struct PlanningHints {
    /// Soft upper bound, surfaced as guidance but not enforced.
    pub max_parallel: Option<usize>,
    /// Hard limit; a plan exceeding this is rejected with a revise prompt.
    pub absolute_max_parallel: Option<usize>,
    /// Nodes that must never appear inside a `plan` array.
    pub sequential_only: Vec<String>,
    /// Allowed co-execution sets: every node in one `plan` must belong to
    /// the same group (or groups aren't enforced if this is empty).
    pub parallel_groups: Vec<Vec<String>>,
    /// Preferred sequence, surfaced in the prompt only.
    pub ordering: Vec<String>,
}

impl PlanningHints {
    /// Validate a `plan` array against `absolute_max_parallel`,
    /// `sequential_only`, and `parallel_groups`. Returns `Err` with a
    /// human-readable violation description suitable for a revise prompt.
    pub fn validate_plan(&self, plan: &[PlanItem]) -> Result<(), String> {
        if let Some(limit) = self.absolute_max_parallel {
            if plan.len() > limit {
                return Err(format!(
                    "plan has {} branches, exceeding absolute_max_parallel of {limit}",
                    plan.len()
                ));
            }
        }

        for item in plan {
            if self.sequential_only.iter().any(|n| n == &item.node) {
                return Err(format!(
                    "node '{}' is sequential_only and cannot appear in a parallel plan",
                    item.node
                ));
            }
        }

        if !self.parallel_groups.is_empty() {
            let plan_nodes: HashSet<&str> = plan.iter().map(|item| item.node.as_str()).collect();
            let allowed = self
                .parallel_groups
                .iter()
                .any(|group| plan_nodes.iter().all(|n| group.iter().any(|g| g == n)));
            if !allowed {
                return Err(
                    "plan spans nodes that don't share an allowed parallel_groups co-execution set"
                        .to_string(),
                );
            }
        }

        Ok(())
    }
}

/// Hides catalog entries a tenant/policy shouldn't see from the LLM, based
/// on headers (tenant scope, roles) or a node's side-effect tag.
pub type ToolVisibility = Arc<dyn Fn(&CatalogEntry, &Headers) -> bool + Send + Sync>;

/// The default visibility predicate: everything is visible.
pub fn allow_all() -> ToolVisibility {
    Arc::new(|_entry, _headers| true)
}
