//! The structured event stream and the middleware observer chain.
//!
//! Every node invocation emits `node_start` and either `node_success` or
//! `node_error`; retries emit `node_retry`. Observers subscribe
//! asynchronously and cannot block node progress beyond a configurable
//! per-event budget — a slow observer is shed with a `middleware_shed`
//! event rather than stalling the graph.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NodeStart {
        trace_id: String,
        node_name: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeSuccess {
        trace_id: String,
        node_name: String,
        node_id: String,
        timestamp: DateTime<Utc>,
        latency_ms: u64,
    },
    NodeError {
        trace_id: String,
        node_name: String,
        node_id: String,
        timestamp: DateTime<Utc>,
        error_class: String,
        error_message: String,
    },
    NodeRetry {
        trace_id: String,
        node_name: String,
        node_id: String,
        timestamp: DateTime<Utc>,
        attempt: usize,
    },
    NodeTimeout {
        trace_id: String,
        node_name: String,
        node_id: String,
        timestamp: DateTime<Utc>,
        duration_ms: u64,
    },
    Chunk(crate::streaming::Chunk),
    Cancelled {
        trace_id: String,
        timestamp: DateTime<Utc>,
    },
    MiddlewareShed {
        observer: String,
        timestamp: DateTime<Utc>,
        event_type: String,
    },
    Custom {
        trace_id: String,
        timestamp: DateTime<Utc>,
        label: String,
        payload: Value,
    },
}

impl Event {
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            Event::NodeStart { trace_id, .. }
            | Event::NodeSuccess { trace_id, .. }
            | Event::NodeError { trace_id, .. }
            | Event::NodeRetry { trace_id, .. }
            | Event::NodeTimeout { trace_id, .. }
            | Event::Cancelled { trace_id, .. }
            | Event::Custom { trace_id, .. } => Some(trace_id),
            Event::Chunk(c) => Some(&c.trace_id),
            Event::MiddlewareShed { .. } => None,
        }
    }
}

/// The `#[serde(tag = "type")]` discriminant for an event, used to label a
/// `MiddlewareShed` notice with what kind of event the shed observer missed.
fn event_type_name(event: &Event) -> &'static str {
    match event {
        Event::NodeStart { .. } => "node_start",
        Event::NodeSuccess { .. } => "node_success",
        Event::NodeError { .. } => "node_error",
        Event::NodeRetry { .. } => "node_retry",
        Event::NodeTimeout { .. } => "node_timeout",
        Event::Chunk(_) => "chunk",
        Event::Cancelled { .. } => "cancelled",
        Event::MiddlewareShed { .. } => "middleware_shed",
        Event::Custom { .. } => "custom",
    }
}

/// An async observer of the event stream.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;
    async fn on_event(&self, event: &Event);
}

/// Fans events out to a set of observers, shedding any observer that
/// exceeds `event_budget` on a given dispatch. Ordering is preserved within
/// a single trace (events for one trace are dispatched sequentially to
/// each observer in registration order) but not across traces.
pub struct EventPipeline {
    observers: Vec<Arc<dyn Middleware>>,
    event_budget: Duration,
}

impl EventPipeline {
    pub fn new(event_budget: Duration) -> Self {
        Self {
            observers: Vec::new(),
            event_budget,
        }
    }

    pub fn register(&mut self, observer: Arc<dyn Middleware>) {
        self.observers.push(observer);
    }

    pub async fn dispatch(&self, event: Event) {
        let event_type = event_type_name(&event).to_string();
        for observer in &self.observers {
            let name = observer.name().to_string();
            let fut = observer.on_event(&event);
            if tokio::time::timeout(self.event_budget, fut).await.is_err() {
                tracing::warn!(observer = %name, "middleware shed: exceeded event budget");
                let shed = Event::MiddlewareShed {
                    observer: name.clone(),
                    timestamp: Utc::now(),
                    event_type: event_type.clone(),
                };
                // Deliver the shed notice to every other observer so it's
                // visible on the structured event stream, not just the log.
                // The observer that was just shed is skipped rather than
                // given a second chance to stall on its own shed notice.
                for other in &self.observers {
                    if other.name() == name {
                        continue;
                    }
                    let _ = tokio::time::timeout(self.event_budget, other.on_event(&shed)).await;
                }
            }
        }
    }
}

impl Default for EventPipeline {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}
