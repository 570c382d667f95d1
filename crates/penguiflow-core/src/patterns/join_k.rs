//! Aggregate exactly `k` messages sharing a trace id before releasing a
//! combined payload downstream.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::cancellation::CancellationRegistry;

#[derive(Default)]
struct Bucket {
    values: Vec<Value>,
}

/// A k-way join keyed by `trace_id`. Buffers arrivals until exactly `k`
/// have been seen for a trace, then hands back the collected values in
/// arrival order. Buckets for a cancelled trace are dropped rather than
/// ever being released.
#[derive(Clone)]
pub struct JoinK {
    k: usize,
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    cancellation: CancellationRegistry,
}

impl JoinK {
    pub fn new(k: usize, cancellation: CancellationRegistry) -> Self {
        Self {
            k: k.max(1),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            cancellation,
        }
    }

    /// Record one arrival for `trace_id`. Returns `Some(values)` once the
    /// bucket has accumulated `k` arrivals, consuming the bucket; otherwise
    /// `None`.
    pub async fn arrive(&self, trace_id: &str, value: Value) -> Option<Vec<Value>> {
        if self.cancellation.is_cancelled(trace_id).await {
            return None;
        }

        let mut guard = self.buckets.lock().await;
        let bucket = guard.entry(trace_id.to_string()).or_default();
        bucket.values.push(value);

        let ready = bucket.values.len() >= self.k;
        if ready {
            guard.remove(trace_id).map(|b| b.values)
        } else {
            None
        }
    }

    /// Drop any buffered arrivals for a trace, e.g. once it is cancelled.
    pub async fn discard(&self, trace_id: &str) {
        self.buckets.lock().await.remove(trace_id);
    }
}

/// Convenience wrapper matching the node-handler shape: join exactly `k`
/// branch results for the current trace, returning them once complete.
pub async fn join_k(joiner: &JoinK, trace_id: &str, value: Value) -> Option<Vec<Value>> {
    joiner.arrive(trace_id, value).await
}
