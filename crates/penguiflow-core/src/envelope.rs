//! The message envelope: the unit of data that flows along a floe.

use crate::headers::Headers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// A deadline attached to a message, either an absolute instant or a
/// duration relative to message construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deadline {
    Absolute(DateTime<Utc>),
    Relative { from: DateTime<Utc>, duration_ms: u64 },
}

impl Deadline {
    pub fn relative(from: DateTime<Utc>, duration: Duration) -> Self {
        Self::Relative {
            from,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Resolve to an absolute instant.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Deadline::Absolute(t) => *t,
            Deadline::Relative { from, duration_ms } => {
                *from + chrono::Duration::milliseconds(*duration_ms as i64)
            }
        }
    }

    pub fn has_elapsed(&self) -> bool {
        Utc::now() >= self.at()
    }
}

/// The message that travels along a floe.
///
/// `trace_id` is assigned once at ingress (or supplied by the caller) and is
/// immutable thereafter — every downstream message and every streamed chunk
/// derived from this message carries the same `trace_id`. `meta` is a free
/// auxiliary map (status callbacks, tenant-scoped context, parallel-branch
/// bookkeeping); routing policies must never read it, only `headers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Value,
    pub headers: Headers,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Deadline>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Envelope {
    /// Construct a new envelope at ingress, generating a fresh `trace_id`
    /// when the caller does not supply one.
    pub fn new(payload: Value, headers: Headers) -> Self {
        Self {
            payload,
            headers,
            trace_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            deadline: None,
            meta: HashMap::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derive a downstream envelope carrying a new payload but the same
    /// `trace_id`, `headers` and `deadline` — the shape every node emission
    /// takes internally.
    pub fn derive(&self, payload: Value) -> Self {
        Self {
            payload,
            headers: self.headers.clone(),
            trace_id: self.trace_id.clone(),
            timestamp: Utc::now(),
            deadline: self.deadline.clone(),
            meta: self.meta.clone(),
        }
    }

    /// Keys in `meta` whose values are JSON-serializable scalars/objects
    /// survive the LLM-visible context boundary; this filters out nothing
    /// at the JSON layer (everything in `meta` is already `Value`), but is
    /// the single seam callers should filter through before handing `meta`
    /// to a planner prompt, per spec's meta-serialization-boundary note.
    pub fn llm_visible_meta(&self) -> HashMap<String, Value> {
        self.meta.clone()
    }
}
