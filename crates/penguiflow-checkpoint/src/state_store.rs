//! The `StateStore` protocol: durable storage for planner pause records and
//! (optionally) per-trace event logs.
//!
//! A pause is a JSON record keyed by an opaque token; the planner is the
//! only consumer that interprets what's inside the record (trajectory,
//! pending action, reason, payload, LLM context — see
//! `penguiflow_planner::pause`). The store itself just does last-write-wins
//! storage with a TTL, exactly as spec §6 requires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

/// Durable storage for planner pause/resume records and (optionally) a
/// per-trace event log. Implementations must be safe under concurrent
/// access from multiple planner runs and must guarantee last-write-wins
/// semantics for a given token on `save_pause`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist `record` under `token` with the given `ttl`. A later
    /// `save_pause` for the same token replaces the record and resets the
    /// TTL window (last-write-wins).
    async fn save_pause(&self, token: &str, record: Value, ttl: Duration) -> Result<()>;

    /// Load the record for `token`, or `None` if it was never saved, has
    /// already been deleted, or its TTL has expired.
    async fn load_pause(&self, token: &str) -> Result<Option<Value>>;

    /// Remove the record for `token`. Idempotent: deleting an unknown or
    /// already-deleted token is not an error.
    async fn delete_pause(&self, token: &str) -> Result<()>;

    /// Append one event to `trace_id`'s durable log. Optional: a store that
    /// does not support trace replay may make this a no-op.
    async fn append_event(&self, trace_id: &str, event: Value) -> Result<()> {
        let _ = (trace_id, event);
        Ok(())
    }

    /// Replay every event appended for `trace_id`, in append order.
    /// Optional: a store without durable event logging returns an empty
    /// list rather than erroring.
    async fn list_events(&self, trace_id: &str) -> Result<Vec<Value>> {
        let _ = trace_id;
        Ok(Vec::new())
    }
}

struct PauseEntry {
    record: Value,
    expires_at: DateTime<Utc>,
}

/// Reference `StateStore` used by tests and the pause/resume path in
/// single-process deployments. TTL expiry is enforced both lazily (on
/// `load_pause`) and via a background sweep task so abandoned pause
/// records don't accumulate indefinitely.
#[derive(Clone)]
pub struct InMemoryStateStore {
    pauses: Arc<RwLock<HashMap<String, PauseEntry>>>,
    events: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            pauses: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn a background task that sweeps expired pause entries every
    /// `interval`. Returns a handle the caller may abort; dropping the
    /// handle does not stop the sweep (matching `tokio::task::JoinHandle`
    /// semantics) — callers that want it stopped must `abort()` explicitly.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let pauses = self.pauses.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let mut guard = pauses.write().await;
                guard.retain(|_, entry| entry.expires_at > now);
            }
        })
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_pause(&self, token: &str, record: Value, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.pauses.write().await.insert(
            token.to_string(),
            PauseEntry { record, expires_at },
        );
        Ok(())
    }

    async fn load_pause(&self, token: &str) -> Result<Option<Value>> {
        let mut guard = self.pauses.write().await;
        match guard.get(token) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.record.clone())),
            Some(_) => {
                guard.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_pause(&self, token: &str) -> Result<()> {
        self.pauses.write().await.remove(token);
        Ok(())
    }

    async fn append_event(&self, trace_id: &str, event: Value) -> Result<()> {
        self.events
            .write()
            .await
            .entry(trace_id.to_string())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn list_events(&self, trace_id: &str) -> Result<Vec<Value>> {
        Ok(self
            .events
            .read()
            .await
            .get(trace_id)
            .cloned()
            .unwrap_or_default())
    }
}
