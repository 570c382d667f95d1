//! Per-trace cancellation.
//!
//! A trace is the unit of cancellation. `cancel(trace_id)` is idempotent
//! and asynchronous: it flips a per-trace token, which every worker races
//! against its next queue read via `tokio::select!`. In-flight invocations
//! see the cancellation at their next suspension point.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or lazily create) the token for a trace. Workers call this
    /// once per message and hold the clone for the duration of that
    /// invocation.
    pub async fn token_for(&self, trace_id: &str) -> CancellationToken {
        if let Some(tok) = self.tokens.read().await.get(trace_id) {
            return tok.clone();
        }
        let mut guard = self.tokens.write().await;
        guard
            .entry(trace_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Idempotent: cancelling an already-cancelled or unknown trace is a
    /// no-op beyond registering the token so future `token_for` calls for
    /// that trace observe the cancellation immediately.
    pub async fn cancel(&self, trace_id: &str) {
        let tok = self.token_for(trace_id).await;
        tok.cancel();
        tracing::info!(trace_id, "trace cancelled");
    }

    pub async fn is_cancelled(&self, trace_id: &str) -> bool {
        self.tokens
            .read()
            .await
            .get(trace_id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    /// Drop bookkeeping for a trace once it has reached a terminal state
    /// (egress fetch, cancellation, or terminal error) to bound memory use.
    pub async fn forget(&self, trace_id: &str) {
        self.tokens.write().await.remove(trace_id);
    }
}
