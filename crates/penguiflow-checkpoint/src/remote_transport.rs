//! The `RemoteTransport` protocol: used by remote-node bridges to invoke a
//! node that lives in another process, propagating cancellation and a
//! deadline the way a local worker invocation would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use penguiflow_core::Headers;

use crate::error::Result;

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Invoke `node_name` on the remote side with `input`, the caller's
    /// `headers` and `trace_id`, and an absolute `deadline`. `cancellation`
    /// is raced against the remote call exactly as a local worker races its
    /// queue read against the trace's cancellation token.
    async fn invoke(
        &self,
        node_name: &str,
        input: Value,
        headers: &Headers,
        trace_id: &str,
        deadline: Option<DateTime<Utc>>,
        cancellation: CancellationToken,
    ) -> Result<Value>;
}

/// A loopback transport that dispatches directly to a local closure rather
/// than crossing a process boundary. Useful for tests that exercise the
/// planner's remote-tool path without standing up real infrastructure.
pub struct LoopbackTransport<F> {
    handler: F,
}

impl<F> LoopbackTransport<F>
where
    F: Fn(&str, Value) -> Result<Value> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> RemoteTransport for LoopbackTransport<F>
where
    F: Fn(&str, Value) -> Result<Value> + Send + Sync,
{
    async fn invoke(
        &self,
        node_name: &str,
        input: Value,
        _headers: &Headers,
        _trace_id: &str,
        _deadline: Option<DateTime<Utc>>,
        cancellation: CancellationToken,
    ) -> Result<Value> {
        if cancellation.is_cancelled() {
            return Err(crate::error::StoreError::RemoteCancelled(node_name.to_string()));
        }
        (self.handler)(node_name, input)
    }
}
