//! # penguiflow-core — an in-process async dataflow runtime
//!
//! `penguiflow-core` runs a typed graph of async nodes connected by bounded
//! queues ("floes"). Each node is driven by its own worker task: pull one
//! message, validate it, invoke the node's handler with timeout/retry/
//! backoff, validate the result, and selectively emit to a subset of
//! declared successors. There is no global superstep or shared-state
//! barrier — a message moves through the graph as fast as backpressure on
//! its floes allows.
//!
//! ## Core concepts
//!
//! - **[`Node`]** — identity, [`Policy`] (validation/timeout/retry), and an
//!   async handler function.
//! - **[`Floe`](floe)** — a bounded mpsc queue between exactly one producer
//!   and one consumer. Queue depth is the runtime's backpressure signal.
//! - **[`Graph`]** / **[`GraphBuilder`]** — static topology, validated once
//!   at construction (no duplicate node ids, no unreachable nodes, no
//!   cycles unless every member opts in via `allow_cycle`).
//! - **[`Runtime`]** — a running instance of a graph: spawns one worker per
//!   node, exposes `submit`/`recv` at the ingress/egress boundary, and
//!   `queue_depth` for observability.
//! - **[`Context`]** — the tagged handle passed to every node invocation.
//!   `Context::Flow` carries successor edges for `ctx.emit`; `Context::Tool`
//!   (a node invoked directly by the planner) has none.
//! - **[`Emission`]** — what a node hands back to the worker: broadcast to
//!   every successor, a named subset, or per-successor distinct payloads.
//! - **[`EventPipeline`]** / **[`Middleware`]** — an async observer chain
//!   with a per-event budget; a slow observer is shed, never blocking
//!   graph progress.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use penguiflow_core::{GraphBuilder, Node, RuntimeBuilder, Envelope, Headers};
//! use serde_json::json;
//!
//! let echo = Node::new("echo", "echo", std::sync::Arc::new(|payload, _ctx| {
//!     Box::pin(async move { Ok(penguiflow_core::Emission::all(payload)) })
//! }));
//!
//! let graph = GraphBuilder::new()
//!     .add_node(echo)?
//!     .with_entry("echo")
//!     .build()?;
//!
//! let mut runtime = RuntimeBuilder::new(graph).spawn();
//! runtime.submit("echo", Envelope::new(json!({"hi": true}), Headers::new("tenant-1"))).await?;
//! let result = runtime.recv().await;
//! # Ok::<(), penguiflow_core::GraphError>(())
//! ```
//!
//! ## Non-goals
//!
//! This crate has no opinion on LLM calls, ReAct planning loops, or durable
//! pause/resume — see `penguiflow-llm`, `penguiflow-planner`, and
//! `penguiflow-checkpoint` respectively. It only runs the graph.

pub mod cancellation;
pub mod catalog;
pub mod context;
pub mod emission;
pub mod envelope;
pub mod error;
pub mod events;
pub mod final_answer;
pub mod floe;
pub mod graph;
pub mod headers;
pub mod node;
pub mod patterns;
pub mod policy;
pub mod registry;
pub mod routing;
pub mod runtime;
pub mod streaming;
pub mod working_memory;
pub mod worker;

pub use cancellation::CancellationRegistry;
pub use catalog::{build_catalog, CatalogEntry};
pub use context::{Context, ContextCore, ContextError, FlowContext, Successors, ToolContext};
pub use emission::Emission;
pub use envelope::{Deadline, Envelope};
pub use error::{GraphError, Result, ValidationDirection};
pub use events::{Event, EventPipeline, Middleware};
pub use final_answer::FinalAnswer;
pub use floe::{floe, FloeReceiver, FloeSender, DEFAULT_CAPACITY};
pub use graph::{EdgeSpec, Graph, GraphBuilder, EGRESS, INGRESS};
pub use headers::Headers;
pub use node::{Node, NodeFn, NodeFuture, NodeId, SideEffect};
pub use policy::{Policy, RetryClassifier, Validate};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};
pub use routing::RoutingPolicy;
pub use runtime::{Runtime, RuntimeBuilder};
pub use streaming::{Admit, Chunk, StreamGate};
pub use working_memory::{Fact, WorkingMemory};
pub use worker::{spawn_worker, WorkerHandle};
