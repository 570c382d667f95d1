//! Immutable routing metadata carried by every message.

use serde::{Deserialize, Serialize};

/// Routing metadata attached to a message envelope.
///
/// `Headers` are set once at ingress and never mutated afterwards — routing
/// policies (predicate routers, tool-filtering hooks) read headers, never
/// `meta`, which keeps routing decisions auditable independent of whatever
/// auxiliary data a node stashed in `meta` along the way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Headers {
    /// Tenant identifier. Required: every message belongs to exactly one
    /// tenant for multi-tenancy and routing purposes.
    pub tenant: String,

    /// Optional topic, e.g. for bridging onto a `MessageBus`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Routing priority. Higher values are not given any special scheduling
    /// treatment by the runtime itself — they're advisory for routing
    /// policies that choose to read them.
    #[serde(default)]
    pub priority: i32,
}

impl Headers {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            topic: None,
            priority: 0,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
