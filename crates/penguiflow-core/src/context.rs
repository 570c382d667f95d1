//! The execution context handle passed to every node invocation.
//!
//! [`Context`] is a tagged variant rather than a duck-typed common
//! interface (the REDESIGN FLAG choice recorded in DESIGN.md): a flow
//! worker gets [`Context::Flow`], a planner tool invocation gets
//! [`Context::Tool`]. Capabilities that make no sense in a mode
//! (`emit`/`fetch` under `Tool`, direct successor emission that has no
//! edges to target) return [`ContextError::UnavailableInMode`] rather than
//! silently no-opping.

use crate::cancellation::CancellationRegistry;
use crate::emission::Emission;
use crate::envelope::Envelope;
use crate::floe::FloeSender;
use crate::headers::Headers;
use crate::streaming::Chunk;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("'{0}' is unavailable in this execution mode")]
    UnavailableInMode(&'static str),
    #[error("emission error: {0}")]
    Emission(#[from] crate::error::GraphError),
}

/// Shared fields every mode carries: the current message's headers, meta,
/// trace id, and the runtime-level cancellation/queue-depth helpers.
#[derive(Clone)]
pub struct ContextCore {
    pub trace_id: String,
    pub headers: Headers,
    pub meta: HashMap<String, Value>,
    pub cancellation: CancellationRegistry,
    pub chunk_tx: Option<tokio::sync::mpsc::Sender<Chunk>>,
    next_chunk_seq: Arc<tokio::sync::Mutex<HashMap<String, u64>>>,
}

impl ContextCore {
    pub fn new(envelope: &Envelope, cancellation: CancellationRegistry) -> Self {
        Self {
            trace_id: envelope.trace_id.clone(),
            headers: envelope.headers.clone(),
            meta: envelope.meta.clone(),
            cancellation,
            chunk_tx: None,
            next_chunk_seq: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub async fn cancel_trace(&self) {
        self.cancellation.cancel(&self.trace_id).await;
    }

    pub async fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled(&self.trace_id).await
    }

    /// Emit an ordered chunk on `stream_id`, auto-assigning the next `seq`
    /// for this `(trace_id, stream_id)`.
    pub async fn emit_chunk(
        &self,
        stream_id: &str,
        text: Option<String>,
        done: bool,
    ) -> Result<(), ContextError> {
        let Some(tx) = &self.chunk_tx else {
            return Err(ContextError::UnavailableInMode("emit_chunk"));
        };
        let mut seqs = self.next_chunk_seq.lock().await;
        let seq = seqs.entry(stream_id.to_string()).or_insert(0);
        let chunk = Chunk {
            trace_id: self.trace_id.clone(),
            stream_id: stream_id.to_string(),
            seq: *seq,
            done,
            text,
            artifact_type: None,
            chunk: None,
        };
        *seq += 1;
        let _ = tx.send(chunk).await;
        Ok(())
    }
}

/// Per-node successor edges available to a flow worker for explicit
/// selective emission via `ctx.emit(value, to)`.
#[derive(Clone, Default)]
pub struct Successors {
    pub senders: HashMap<String, FloeSender>,
}

/// The flow-worker variant: has successor edges to emit to and can fetch
/// its own inbound message (for controller nodes).
#[derive(Clone)]
pub struct FlowContext {
    pub core: ContextCore,
    pub successors: Successors,
}

impl FlowContext {
    /// Explicit selective emission to a subset of declared successors.
    pub async fn emit(&self, value: Value, to: Option<Vec<String>>) -> Result<(), ContextError> {
        let names = self.successors.senders.keys().cloned().collect::<Vec<_>>();
        let emission = match to {
            Some(targets) => Emission::to(targets, value),
            None => Emission::all(value),
        };
        let resolved = emission.resolve(&names)?;
        let envelope_headers = self.core.headers.clone();
        for (target, payload) in resolved {
            if let Some(sender) = self.successors.senders.get(&target) {
                let mut envelope = Envelope::new(payload, envelope_headers.clone());
                envelope.trace_id = self.core.trace_id.clone();
                envelope.meta = self.core.meta.clone();
                sender.send(envelope).await?;
            }
        }
        Ok(())
    }

    pub fn queue_depth(&self, successor: &str) -> Option<usize> {
        self.successors.senders.get(successor).map(|s| s.depth())
    }
}

/// The planner-tool variant: a node invoked directly as a tool call has no
/// successor edges and no inbound queue of its own to fetch from.
#[derive(Clone)]
pub struct ToolContext {
    pub core: ContextCore,
    pub branch_index: Option<usize>,
}

/// Tagged execution-context variant handed to node implementation
/// functions.
#[derive(Clone)]
pub enum Context {
    Flow(FlowContext),
    Tool(ToolContext),
}

impl Context {
    pub fn core(&self) -> &ContextCore {
        match self {
            Context::Flow(f) => &f.core,
            Context::Tool(t) => &t.core,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.core().trace_id
    }

    pub fn headers(&self) -> &Headers {
        &self.core().headers
    }

    pub fn meta(&self) -> &HashMap<String, Value> {
        &self.core().meta
    }

    pub async fn cancel_trace(&self) {
        self.core().cancel_trace().await
    }

    pub async fn is_cancelled(&self) -> bool {
        self.core().is_cancelled().await
    }

    pub async fn emit_chunk(
        &self,
        stream_id: &str,
        text: Option<String>,
        done: bool,
    ) -> Result<(), ContextError> {
        self.core().emit_chunk(stream_id, text, done).await
    }

    /// Explicit selective emission. Only available in `Flow` mode.
    pub async fn emit(&self, value: Value, to: Option<Vec<String>>) -> Result<(), ContextError> {
        match self {
            Context::Flow(f) => f.emit(value, to).await,
            Context::Tool(_) => Err(ContextError::UnavailableInMode("emit")),
        }
    }

    pub fn queue_depth(&self, successor: &str) -> Option<usize> {
        match self {
            Context::Flow(f) => f.queue_depth(successor),
            Context::Tool(_) => None,
        }
    }
}
