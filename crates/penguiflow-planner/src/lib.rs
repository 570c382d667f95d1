//! # penguiflow-planner — the ReAct planner core
//!
//! Drives a typed tool catalog (built from `penguiflow_core::CatalogEntry`)
//! through a structured action schema asked of an LLM each turn: call one
//! tool ([`action::Action::Sequential`]), fan out several concurrently and
//! optionally join them ([`action::Action::Parallel`]), or finish
//! ([`action::Action::Finish`]).
//!
//! ## Core concepts
//!
//! - **[`action`]** — the action schema and lenient JSON extraction/repair
//!   of an LLM's raw response into one of the three shapes.
//! - **[`trajectory`]** — the append-only per-run log, a pluggable
//!   [`trajectory::TokenEstimator`], and in-place compression once a run's
//!   estimated token cost exceeds its budget.
//! - **[`budget`]** — hop/deadline/token budget checks and advisory
//!   [`budget::PlanningHints`] (`max_parallel`, `sequential_only`,
//!   `parallel_groups`) enforced by the plan validator, never by the LLM.
//! - **[`tool_exec`]** — direct tool invocation (validate/timeout/retry,
//!   the same envelope a flow worker applies) and parallel-plan execution
//!   with partial-failure-aware join semantics.
//! - **[`pause`]** — the `pause(reason, payload)` sentinel a tool returns
//!   to suspend a run, and the durable record persisted via
//!   `penguiflow_checkpoint::StateStore` behind an opaque resume token.
//! - **[`planner`]** — [`planner::Planner`] / [`planner::PlannerBuilder`],
//!   the driven loop tying all of the above together into `run()` and
//!   `resume()`.
//!
//! ## Non-goals
//!
//! This crate has no opinion on what LLM provider answers `call()`
//! (`penguiflow-llm` is the seam) or what backs durable pause storage
//! (`penguiflow-checkpoint` is the seam). It only runs the ReAct loop.

pub mod action;
pub mod budget;
pub mod error;
pub mod pause;
pub mod planner;
pub mod tool_exec;
pub mod trajectory;

pub use action::{Action, JoinSpec, PlanItem};
pub use budget::{BudgetExhausted, Budgets, PlanningHints, ToolVisibility};
pub use error::{PlannerError, Result};
pub use pause::{pause_request, IdempotencyCache, PauseReason, PauseRecord};
pub use planner::{FinishReason, Planner, PlannerBuilder, RunOutcome};
pub use tool_exec::{execute_plan, invoke_tool, BranchOutcome, PlanExecutionResult};
pub use trajectory::{CharCountEstimator, Trajectory, TokenEstimator, TrajectoryStep};
