//! Subflow invocation: run a playbook (a nested [`crate::runtime::Runtime`])
//! as if it were a single node, forwarding the caller's trace id so
//! cancellation and correlation both follow it.

use serde_json::Value;

use crate::context::Context;
use crate::envelope::Envelope;
use crate::error::{GraphError, Result};
use crate::runtime::Runtime;

/// Invoke `runtime` as a subflow: submit `payload` at `entry` under the
/// calling node's own `trace_id` and headers, wait for its single egress
/// result, and return the resulting payload. The parent's trace id is also
/// recorded under `meta["parent_trace_id"]` on the child envelope so
/// nested playbook-of-playbook invocations stay correlated even though the
/// trace id itself is shared, not rewritten.
///
/// Cancelling the parent trace (via `parent_ctx`) cancels the child: the
/// child runtime has its own independent [`crate::cancellation::CancellationRegistry`],
/// so this race explicitly forwards the cancellation rather than relying
/// on the shared trace id alone.
pub async fn call_playbook(
    runtime: &mut Runtime,
    playbook_name: &str,
    entry: &str,
    payload: Value,
    parent_ctx: &Context,
) -> Result<Value> {
    let core = parent_ctx.core();
    let trace_id = core.trace_id.clone();

    let mut child = Envelope::new(payload, core.headers.clone());
    child.trace_id = trace_id.clone();
    child
        .meta
        .insert("parent_trace_id".to_string(), Value::String(trace_id.clone()));

    runtime.submit(entry, child).await.map_err(|e| GraphError::Playbook {
        playbook: playbook_name.to_string(),
        error: e.to_string(),
    })?;

    let cancel_token = core.cancellation.token_for(&trace_id).await;

    tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
            runtime.cancel_trace(&trace_id).await;
            Err(GraphError::Cancelled { trace_id })
        }
        result = runtime.recv() => match result {
            Some(result) => Ok(result.payload),
            None => Err(GraphError::Playbook {
                playbook: playbook_name.to_string(),
                error: "subflow closed without producing a result".to_string(),
            }),
        },
    }
}
