//! Durable pause/resume (spec §4.12): a tool suspends the planner by
//! returning a sentinel pause request; the planner serializes its full
//! state behind an opaque `resume_token` and persists it via
//! [`penguiflow_checkpoint::StateStore`]. Resuming is made idempotent by a
//! small planner-local cache keyed on `(token, hash(user_input))` — the
//! store itself only guarantees last-write-wins per token (spec §6), so
//! idempotency has to live on this side of the seam.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use penguiflow_core::Headers;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::trajectory::Trajectory;

/// Why a tool asked the planner to suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    ApprovalRequired,
    AwaitInput,
    ExternalEvent,
    ConstraintsConflict,
}

impl PauseReason {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "approval_required" => Some(PauseReason::ApprovalRequired),
            "await_input" => Some(PauseReason::AwaitInput),
            "external_event" => Some(PauseReason::ExternalEvent),
            "constraints_conflict" => Some(PauseReason::ConstraintsConflict),
            _ => None,
        }
    }
}

/// Everything needed to resume a suspended run: the full trajectory so
/// far, the pending-step bookkeeping, and enough of the LLM context to
/// keep prompting coherently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseRecord {
    pub resume_token: String,
    pub reason: PauseReason,
    pub payload: Value,
    pub trajectory: Trajectory,
    pub hops: u32,
    pub headers: Headers,
    pub trace_id: String,
    pub user_query: String,
    /// The node id of the tool that requested the pause and the args it
    /// was invoked with — `user_input` on resume is fed in as that step's
    /// observation.
    pub pending_node: String,
    pub pending_args: Value,
}

impl PauseRecord {
    pub fn new_token() -> String {
        Uuid::new_v4().to_string()
    }
}

fn hash_user_input(value: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Planner-local cache making `resume(token, user_input)` idempotent: a
/// repeated call with the same `(token, user_input)` returns the
/// previously-computed outcome rather than re-executing the remainder of
/// the run.
#[derive(Default)]
pub struct IdempotencyCache {
    entries: Mutex<HashMap<(String, u64), Value>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, token: &str, user_input: &Value) -> Option<Value> {
        let key = (token.to_string(), hash_user_input(user_input));
        self.entries.lock().await.get(&key).cloned()
    }

    pub async fn put(&self, token: &str, user_input: &Value, outcome: Value) {
        let key = (token.to_string(), hash_user_input(user_input));
        self.entries.lock().await.insert(key, outcome);
    }
}

/// A tool signals a pause request by returning this sentinel shape from its
/// handler, rather than a normal observation. Detected at the tool-call
/// boundary in `planner.rs` after every successful invocation.
pub fn detect_pause_request(value: &Value) -> Option<(PauseReason, Value)> {
    let obj = value.as_object()?;
    if !obj.get("__pause__").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let reason = obj.get("reason").and_then(Value::as_str).and_then(PauseReason::from_str_loose)?;
    let payload = obj.get("payload").cloned().unwrap_or(Value::Null);
    Some((reason, payload))
}

/// Build the sentinel value a tool handler returns to request a pause.
/// Exported so test tools (and real ones, outside this crate) can request
/// one without hand-rolling the shape.
pub fn pause_request(reason: PauseReason, payload: Value) -> Value {
    serde_json::json!({"__pause__": true, "reason": reason, "payload": payload})
}
