//! Error type for the planner crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlannerError>;

#[derive(Error, Debug)]
pub enum PlannerError {
    /// The LLM never produced a JSON action the repair pass could salvage,
    /// even after the one "fix the JSON" retry round.
    #[error("could not extract a valid action from the LLM response: {0}")]
    UnparseableAction(String),

    /// The action referenced a node id the planner's catalog doesn't know
    /// about.
    #[error("unknown node '{0}' referenced by planner action")]
    UnknownNode(String),

    /// A `plan` violated a planning-hint constraint (`absolute_max_parallel`,
    /// `sequential_only`, disallowed `parallel_groups` co-execution).
    #[error("plan violates constraint: {0}")]
    ConstraintViolation(String),

    /// A `resume_token` was not found, or its record had already expired in
    /// the state store.
    #[error("resume token '{0}' is unknown or expired")]
    UnknownResumeToken(String),

    /// The execution of a tool (graph node invoked directly) failed and was
    /// not retried away.
    #[error(transparent)]
    ToolExecution(#[from] penguiflow_core::GraphError),

    /// The configured LLM client failed.
    #[error(transparent)]
    Llm(#[from] penguiflow_llm::LlmError),

    /// The configured state store failed while persisting or loading a
    /// pause record.
    #[error(transparent)]
    Store(#[from] penguiflow_checkpoint::StoreError),

    /// JSON (de)serialization error outside the lenient action-repair path.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
