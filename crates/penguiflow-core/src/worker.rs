//! The per-node worker loop: read a message, race it against cancellation,
//! validate, invoke with timeout/retry/backoff, validate the result, and
//! selectively emit to successors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::cancellation::CancellationRegistry;
use crate::context::{Context, ContextCore, FlowContext, Successors};
use crate::envelope::Envelope;
use crate::error::{GraphError, ValidationDirection};
use crate::events::{Event, EventPipeline};
use crate::floe::{FloeReceiver, FloeSender};
use crate::node::Node;
use crate::registry::SchemaRegistry;
use crate::routing::{self, RoutingPolicy};
use crate::streaming::Chunk;

/// A running worker task and the node id it services.
pub struct WorkerHandle {
    pub node_id: String,
    pub join: JoinHandle<()>,
}

/// Spawn the worker loop for one node. `successors` is this node's outbound
/// floe senders, keyed by successor node id. `chunk_tx` forwards streamed
/// chunks emitted via `ctx.emit_chunk` into the shared event pipeline.
pub fn spawn_worker(
    node: Node,
    mut inbound: FloeReceiver,
    successors: Successors,
    registry: SchemaRegistry,
    events: Arc<EventPipeline>,
    cancellation: CancellationRegistry,
    chunk_tx: tokio::sync::mpsc::Sender<Chunk>,
    routing_policy: Option<RoutingPolicy>,
    error_sink: Option<FloeSender>,
) -> WorkerHandle {
    let node_id = node.node_id.clone();
    let join = tokio::spawn(async move {
        while let Some(envelope) = inbound.recv().await {
            handle_message(
                &node,
                envelope,
                &successors,
                &registry,
                &events,
                &cancellation,
                &chunk_tx,
                routing_policy.as_ref(),
                error_sink.as_ref(),
            )
            .await;
        }
    });
    WorkerHandle { node_id, join }
}

#[allow(clippy::too_many_arguments)]
async fn handle_message(
    node: &Node,
    envelope: Envelope,
    successors: &Successors,
    registry: &SchemaRegistry,
    events: &EventPipeline,
    cancellation: &CancellationRegistry,
    chunk_tx: &tokio::sync::mpsc::Sender<Chunk>,
    routing_policy: Option<&RoutingPolicy>,
    error_sink: Option<&FloeSender>,
) {
    let trace_id = envelope.trace_id.clone();
    let token = cancellation.token_for(&trace_id).await;

    let span = tracing::info_span!("node", node = %node.name, trace_id = %trace_id);
    let _entered = span.enter();

    if token.is_cancelled() {
        events
            .dispatch(Event::Cancelled {
                trace_id: trace_id.clone(),
                timestamp: Utc::now(),
            })
            .await;
        return;
    }

    events
        .dispatch(Event::NodeStart {
            trace_id: trace_id.clone(),
            node_name: node.name.clone(),
            node_id: node.node_id.clone(),
            timestamp: Utc::now(),
        })
        .await;

    if node.policy.validate.validates_input() {
        if let Err(e) = registry.validate(&node.node_id, ValidationDirection::Input, &envelope.payload) {
            fail_terminal(events, error_sink, node, &envelope, &e).await;
            return;
        }
    }

    let mut core = ContextCore::new(&envelope, cancellation.clone());
    core.chunk_tx = Some(chunk_tx.clone());
    let ctx = Context::Flow(FlowContext {
        core,
        successors: successors.clone(),
    });

    let mut attempt = 0usize;
    loop {
        let started = Instant::now();
        let outcome = invoke_once(node, envelope.payload.clone(), ctx.clone(), &token, attempt).await;

        match outcome {
            Ok(emission) => {
                if node.policy.validate.validates_output() {
                    if let Some(flat) = emission_preview(&emission) {
                        if let Err(e) = registry.validate(&node.node_id, ValidationDirection::Output, &flat) {
                            fail_terminal(events, error_sink, node, &envelope, &e).await;
                            return;
                        }
                    }
                }

                if let Context::Flow(flow) = &ctx {
                    let names = flow.successors.senders.keys().cloned().collect::<Vec<_>>();
                    match emission.resolve(&names) {
                        Ok(resolved) => {
                            let resolved = routing::apply_policy(
                                routing_policy,
                                &envelope.headers,
                                &envelope.payload,
                                resolved,
                            );
                            for (target, payload) in resolved {
                                if let Some(sender) = flow.successors.senders.get(&target) {
                                    let downstream = envelope.derive(payload);
                                    // A full downstream floe must not block a
                                    // cancelled trace forever: race the send
                                    // against cancellation exactly as
                                    // `invoke_once` races the node call.
                                    tokio::select! {
                                        biased;
                                        _ = token.cancelled() => {
                                            events
                                                .dispatch(Event::Cancelled {
                                                    trace_id: trace_id.clone(),
                                                    timestamp: Utc::now(),
                                                })
                                                .await;
                                            return;
                                        }
                                        result = sender.send(downstream) => {
                                            if result.is_err() {
                                                tracing::warn!(target, "floe closed, dropping emission");
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            fail_terminal(events, error_sink, node, &envelope, &e).await;
                            return;
                        }
                    }
                }

                events
                    .dispatch(Event::NodeSuccess {
                        trace_id: trace_id.clone(),
                        node_name: node.name.clone(),
                        node_id: node.node_id.clone(),
                        timestamp: Utc::now(),
                        latency_ms: started.elapsed().as_millis() as u64,
                    })
                    .await;
                return;
            }
            Err(WorkerError::Cancelled) => {
                events
                    .dispatch(Event::Cancelled {
                        trace_id: trace_id.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                return;
            }
            Err(WorkerError::Timeout(duration)) => {
                events
                    .dispatch(Event::NodeTimeout {
                        trace_id: trace_id.clone(),
                        node_name: node.name.clone(),
                        node_id: node.node_id.clone(),
                        timestamp: Utc::now(),
                        duration_ms: duration.as_millis() as u64,
                    })
                    .await;
                let err = GraphError::Timeout {
                    node: node.node_id.clone(),
                    duration_ms: duration.as_millis() as u64,
                };
                if node.policy.should_retry(attempt, &err) {
                    events
                        .dispatch(Event::NodeRetry {
                            trace_id: trace_id.clone(),
                            node_name: node.name.clone(),
                            node_id: node.node_id.clone(),
                            timestamp: Utc::now(),
                            attempt: attempt + 1,
                        })
                        .await;
                    tokio::time::sleep(node.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                fail_terminal(events, error_sink, node, &envelope, &err).await;
                return;
            }
            Err(WorkerError::Node(e)) => {
                if node.policy.should_retry(attempt, &e) {
                    events
                        .dispatch(Event::NodeRetry {
                            trace_id: trace_id.clone(),
                            node_name: node.name.clone(),
                            node_id: node.node_id.clone(),
                            timestamp: Utc::now(),
                            attempt: attempt + 1,
                        })
                        .await;
                    tokio::time::sleep(node.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                fail_terminal(events, error_sink, node, &envelope, &e).await;
                return;
            }
        }
    }
}

enum WorkerError {
    Cancelled,
    Timeout(Duration),
    Node(GraphError),
}

async fn invoke_once(
    node: &Node,
    payload: serde_json::Value,
    ctx: Context,
    token: &tokio_util::sync::CancellationToken,
    attempt: usize,
) -> Result<crate::emission::Emission, WorkerError> {
    let handler = node.handler.clone();
    let fut = handler(payload, ctx);
    let node_id = node.node_id.clone();

    let invocation = async move {
        match node.policy.timeout {
            Some(duration) => match tokio::time::timeout(duration, fut).await {
                Ok(result) => result.map_err(|e| {
                    WorkerError::Node(GraphError::node_execution(node_id, attempt + 1, e.to_string()))
                }),
                Err(_) => Err(WorkerError::Timeout(duration)),
            },
            None => fut.await.map_err(|e| {
                WorkerError::Node(GraphError::node_execution(node_id, attempt + 1, e.to_string()))
            }),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WorkerError::Cancelled),
        result = invocation => result,
    }
}

/// The registry only ever validates a single JSON value; for `PerTarget`
/// emissions there's no single output shape to validate, so only `All` and
/// single-target `Targets` emissions get an output-schema check.
fn emission_preview(emission: &crate::emission::Emission) -> Option<serde_json::Value> {
    use crate::emission::Emission;
    match emission {
        Emission::All(value) => Some(value.clone()),
        Emission::Targets { value, .. } => Some(value.clone()),
        Emission::PerTarget(_) | Emission::None => None,
    }
}

async fn dispatch_error(events: &EventPipeline, node: &Node, trace_id: &str, error: &GraphError) {
    events
        .dispatch(Event::NodeError {
            trace_id: trace_id.to_string(),
            node_name: node.name.clone(),
            node_id: node.node_id.clone(),
            timestamp: Utc::now(),
            error_class: error_class(error).to_string(),
            error_message: error.to_string(),
        })
        .await;
}

/// A node's terminal failure (retries exhausted, validation failed, or a
/// selective-emission violation): emit the `node_error` event, then either
/// route a structured error message to the graph's configured error sink
/// or let the trace end here (spec §4.1/§7).
async fn fail_terminal(
    events: &EventPipeline,
    error_sink: Option<&FloeSender>,
    node: &Node,
    envelope: &Envelope,
    error: &GraphError,
) {
    dispatch_error(events, node, &envelope.trace_id, error).await;

    if let Some(sink) = error_sink {
        let payload = serde_json::json!({
            "node_id": node.node_id,
            "node_name": node.name,
            "error_class": error_class(error),
            "error_message": error.to_string(),
        });
        let routed = envelope.derive(payload);
        if sink.send(routed).await.is_err() {
            tracing::warn!(node = %node.node_id, "error sink floe closed, dropping routed error");
        }
    }
}

fn error_class(error: &GraphError) -> &'static str {
    match error {
        GraphError::Topology(_) => "topology",
        GraphError::Validation { .. } => "validation",
        GraphError::NodeExecution { .. } => "node_execution",
        GraphError::Timeout { .. } => "timeout",
        GraphError::Cancelled { .. } => "cancelled",
        GraphError::Playbook { .. } => "playbook",
        GraphError::MapItem { .. } => "map_item",
        GraphError::Serialization(_) => "serialization",
        GraphError::Store(_) => "store",
        GraphError::Custom(_) => "custom",
    }
}
