//! Ordered streaming chunks bound to `(trace_id, stream_id)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A single fragment of a stream. `artifact_type = "ui_component"` signals
/// a structured UI payload carried in `chunk` rather than plain `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub trace_id: String,
    pub stream_id: String,
    pub seq: u64,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<Value>,
}

/// Tracks the next expected `seq` and terminal state per `(trace_id,
/// stream_id)` so gaps and post-`done` stragglers can be dropped rather
/// than delivered out of order.
#[derive(Clone, Default)]
pub struct StreamGate {
    state: Arc<Mutex<HashMap<(String, String), GateState>>>,
}

#[derive(Default)]
struct GateState {
    next_seq: u64,
    done: bool,
}

/// Outcome of admitting a chunk through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    Accepted,
    /// Arrived after `done=true` on this `(trace_id, stream_id)`.
    DiscardedAfterDone,
    /// `seq` was not the expected next value (gap or duplicate).
    DiscardedOutOfOrder,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `chunk`, enforcing strictly-increasing `seq` starting at 0 and
    /// rejecting anything after a `done=true` chunk for the same key.
    pub async fn admit(&self, chunk: &Chunk) -> Admit {
        let key = (chunk.trace_id.clone(), chunk.stream_id.clone());
        let mut guard = self.state.lock().await;
        let entry = guard.entry(key).or_default();

        if entry.done {
            return Admit::DiscardedAfterDone;
        }
        if chunk.seq != entry.next_seq {
            return Admit::DiscardedOutOfOrder;
        }

        entry.next_seq += 1;
        if chunk.done {
            entry.done = true;
        }
        Admit::Accepted
    }
}
