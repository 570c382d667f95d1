//! Error types for graph construction and execution.
//!
//! All fallible operations in this crate return [`GraphError`], a single
//! `thiserror`-derived enum covering both *construction*-time failures
//! (bad topology, duplicate node names) and *execution*-time failures
//! (node errors, timeouts, cancellation, validation). Keeping one error
//! type rather than one-per-module makes it straightforward for callers to
//! `match` on the failure kind regardless of which part of the runtime
//! produced it.

use thiserror::Error;

/// Convenience alias for `Result<T, GraphError>`.
pub type Result<T> = std::result::Result<T, GraphError>;

/// All errors the graph runtime can produce.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Topology is invalid: a cycle without `allow_cycle`, a duplicate node
    /// name, a dangling edge target, or no path to egress.
    #[error("graph topology invalid: {0}")]
    Topology(String),

    /// Input or output payload failed registry schema validation.
    #[error("validation failed for node '{node}' ({direction}): {error}")]
    Validation {
        node: String,
        direction: ValidationDirection,
        error: String,
    },

    /// The node function itself raised an error. `attempt` is 1-indexed.
    #[error("node '{node}' failed on attempt {attempt}: {error}")]
    NodeExecution {
        node: String,
        attempt: usize,
        error: String,
    },

    /// A node invocation exceeded its configured timeout.
    #[error("node '{node}' timed out after {duration_ms}ms")]
    Timeout { node: String, duration_ms: u64 },

    /// The trace carrying this message was cancelled. Never retried.
    #[error("trace '{trace_id}' was cancelled")]
    Cancelled { trace_id: String },

    /// A subflow (playbook) invocation failed.
    #[error("playbook '{playbook}' failed: {error}")]
    Playbook { playbook: String, error: String },

    /// `map_concurrent` surfaces the first item failure with its index.
    #[error("map_concurrent item {index} failed: {error}")]
    MapItem { index: usize, error: String },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wraps a `StateStore`/`MessageBus` protocol failure surfaced through
    /// the graph (e.g. during subflow checkpointing bridges).
    #[error("store error: {0}")]
    Store(String),

    /// Catch-all for application-defined node failures that don't fit the
    /// categories above.
    #[error("{0}")]
    Custom(String),
}

/// Which side of a node invocation a validation failure occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDirection {
    Input,
    Output,
}

impl std::fmt::Display for ValidationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationDirection::Input => write!(f, "input"),
            ValidationDirection::Output => write!(f, "output"),
        }
    }
}

impl GraphError {
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    pub fn validation(
        node: impl Into<String>,
        direction: ValidationDirection,
        error: impl Into<String>,
    ) -> Self {
        Self::Validation {
            node: node.into(),
            direction,
            error: error.into(),
        }
    }

    pub fn node_execution(node: impl Into<String>, attempt: usize, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            attempt,
            error: error.into(),
        }
    }

    pub fn cancelled(trace_id: impl Into<String>) -> Self {
        Self::Cancelled {
            trace_id: trace_id.into(),
        }
    }

    /// Whether this error kind is ever eligible for retry. `Cancelled` is
    /// never retried regardless of the node's `retry_classifier` (spec
    /// invariant: cancellation always short-circuits).
    pub fn is_retryable_by_default(&self) -> bool {
        !matches!(self, GraphError::Cancelled { .. })
    }
}
