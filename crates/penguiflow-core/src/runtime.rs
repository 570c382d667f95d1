//! Runtime lifecycle: wiring floes between workers, ingress/egress,
//! draining on stop, and the observable queue-depth surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cancellation::CancellationRegistry;
use crate::context::Successors;
use crate::envelope::Envelope;
use crate::error::{GraphError, Result};
use crate::events::{Event, EventPipeline, Middleware};
use crate::floe::{floe, FloeSender, DEFAULT_CAPACITY};
use crate::graph::Graph;
use crate::registry::SchemaRegistry;
use crate::routing::RoutingPolicy;
use crate::streaming::{Admit, Chunk, StreamGate};
use crate::worker::{spawn_worker, WorkerHandle};

/// A running instance of a [`Graph`]: one worker task per node, wired
/// together by floes, plus ingress senders and an egress receiver.
pub struct Runtime {
    ingress: HashMap<String, FloeSender>,
    egress: mpsc::Receiver<Envelope>,
    workers: Vec<WorkerHandle>,
    cancellation: CancellationRegistry,
    events: Arc<EventPipeline>,
    stream_gate: StreamGate,
    /// `(from, to) -> sender`, retained read-only for `queue_depth` queries
    /// after the senders themselves are handed to their owning workers.
    edge_senders: HashMap<(String, String), FloeSender>,
}

/// Assembles a [`Runtime`] from a validated [`Graph`].
pub struct RuntimeBuilder {
    graph: Graph,
    registry: SchemaRegistry,
    observers: Vec<Arc<dyn Middleware>>,
    event_budget: Duration,
    egress_capacity: usize,
    routing_policy: Option<RoutingPolicy>,
}

impl RuntimeBuilder {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            registry: SchemaRegistry::default(),
            observers: Vec::new(),
            event_budget: Duration::from_millis(50),
            egress_capacity: DEFAULT_CAPACITY,
            routing_policy: None,
        }
    }

    /// Install the optional routing policy hook (spec §4.4): every
    /// emission's resolved successor set passes through it before
    /// messages go out.
    pub fn with_routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.routing_policy = Some(policy);
        self
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Middleware>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_event_budget(mut self, budget: Duration) -> Self {
        self.event_budget = budget;
        self
    }

    /// Spawn one worker per node, wiring a bounded floe for every declared
    /// edge plus a synthetic egress floe for every node with no declared
    /// successors.
    pub fn spawn(self) -> Runtime {
        let mut events = EventPipeline::new(self.event_budget);
        for observer in self.observers {
            events.register(observer);
        }
        let events = Arc::new(events);
        let cancellation = CancellationRegistry::new();
        let stream_gate = StreamGate::new();

        let (egress_tx, egress_rx) = mpsc::channel::<Envelope>(self.egress_capacity);
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Chunk>(DEFAULT_CAPACITY);

        // Forward admitted chunks into the event pipeline; out-of-order or
        // post-done stragglers are dropped at the gate.
        {
            let gate = stream_gate.clone();
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(chunk) = chunk_rx.recv().await {
                    if gate.admit(&chunk).await == Admit::Accepted {
                        events.dispatch(Event::Chunk(chunk)).await;
                    }
                }
            });
        }

        // Build a floe per edge, grouping receivers by destination node and
        // senders by source node.
        let mut senders_by_source: HashMap<String, HashMap<String, FloeSender>> = HashMap::new();
        let mut receiver_by_node: HashMap<String, crate::floe::FloeReceiver> = HashMap::new();

        for node in self.graph.nodes() {
            let successors = self.graph.successors_of(&node.node_id);
            if successors.is_empty() {
                // No declared successors: wire straight to egress.
                let (tx, rx) = floe(node.node_id.clone(), "__egress__", DEFAULT_CAPACITY);
                senders_by_source
                    .entry(node.node_id.clone())
                    .or_default()
                    .insert("__egress__".to_string(), tx);
                let egress_tx = egress_tx.clone();
                tokio::spawn(forward_to_egress(rx, egress_tx));
            }
        }

        let mut edge_senders = HashMap::new();
        for edge in self.graph_edges() {
            let (tx, rx) = floe(edge.from.clone(), edge.to.clone(), edge.capacity.max(1));
            edge_senders.insert((edge.from.clone(), edge.to.clone()), tx.clone());
            senders_by_source
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone(), tx);
            receiver_by_node.insert(format!("{}->{}", edge.from, edge.to), rx);
        }

        // Entry nodes additionally get an ingress floe the caller writes to.
        let mut ingress = HashMap::new();
        let mut inbound_by_node: HashMap<String, Vec<crate::floe::FloeReceiver>> = HashMap::new();
        for entry in self.graph.entry_nodes() {
            let (tx, rx) = floe("__ingress__", entry.clone(), DEFAULT_CAPACITY);
            ingress.insert(entry.clone(), tx);
            inbound_by_node.entry(entry.clone()).or_default().push(rx);
        }
        for (key, rx) in receiver_by_node {
            if let Some((_, to)) = key.split_once("->") {
                inbound_by_node.entry(to.to_string()).or_default().push(rx);
            }
        }

        // Wire the error sink, if configured, as one more producer into its
        // target node's inbound set, exactly like an ingress floe.
        let error_sink_tx = self.graph.error_sink().map(|sink| {
            let (tx, rx) = floe("__error_sink__", sink, DEFAULT_CAPACITY);
            inbound_by_node.entry(sink.to_string()).or_default().push(rx);
            tx
        });
        let error_sink_node = self.graph.error_sink().map(|s| s.to_string());

        let routing_policy = self.routing_policy.clone();

        let mut workers = Vec::new();
        for node in self.graph.nodes() {
            let senders = senders_by_source.remove(&node.node_id).unwrap_or_default();
            let successors = Successors { senders };
            let mut inbounds = inbound_by_node.remove(&node.node_id).unwrap_or_default();

            // A node may have at most one inbound queue in this runtime:
            // fan-in across multiple producers into one node is modeled as
            // multiple distinct edges merged upstream via a join pattern,
            // not multiple consumers of a single floe.
            let inbound = if inbounds.len() <= 1 {
                inbounds.pop()
            } else {
                let merged = merge_inbounds(inbounds, DEFAULT_CAPACITY);
                Some(merged)
            };

            // A node never routes its own errors to itself.
            let sink_for_node = match &error_sink_node {
                Some(sink) if sink == &node.node_id => None,
                _ => error_sink_tx.clone(),
            };

            if let Some(inbound) = inbound {
                let handle = spawn_worker(
                    node.clone(),
                    inbound,
                    successors,
                    self.registry.clone(),
                    events.clone(),
                    cancellation.clone(),
                    chunk_tx.clone(),
                    routing_policy.clone(),
                    sink_for_node,
                );
                workers.push(handle);
            }
        }

        Runtime {
            ingress,
            egress: egress_rx,
            workers,
            cancellation,
            events,
            stream_gate,
            edge_senders,
        }
    }

    fn graph_edges(&self) -> Vec<crate::graph::EdgeSpec> {
        self.graph.edges.clone()
    }
}

/// Merge several producers into a single consumer queue by relaying every
/// message into one combined channel, preserving per-producer ordering but
/// not a global total order across producers.
fn merge_inbounds(
    mut receivers: Vec<crate::floe::FloeReceiver>,
    capacity: usize,
) -> crate::floe::FloeReceiver {
    let (tx, rx) = mpsc::channel::<Envelope>(capacity.max(1));
    for mut receiver in receivers.drain(..) {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
        });
    }
    crate::floe::FloeReceiver {
        from: "__merged__".to_string(),
        to: "__merged__".to_string(),
        rx,
    }
}

async fn forward_to_egress(mut rx: crate::floe::FloeReceiver, tx: mpsc::Sender<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        if tx.send(envelope).await.is_err() {
            break;
        }
    }
}

impl Runtime {
    /// Submit a message at one of the graph's entry nodes.
    pub async fn submit(&self, entry: &str, envelope: Envelope) -> Result<()> {
        let sender = self
            .ingress
            .get(entry)
            .ok_or_else(|| GraphError::topology(format!("'{entry}' is not an entry node")))?;
        sender.send(envelope).await
    }

    /// Receive the next message to reach egress (a node with no declared
    /// successors).
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.egress.recv().await
    }

    /// Cancel every in-flight and future invocation for `trace_id`. Does
    /// not forget the token immediately — in-flight workers still need to
    /// observe it via `ctx.is_cancelled()`/the cancellation race in
    /// `invoke_once`. Bookkeeping is reclaimed later by whichever worker
    /// observes the trace reach a terminal state.
    pub async fn cancel_trace(&self, trace_id: &str) {
        self.cancellation.cancel(trace_id).await;
    }

    pub fn events(&self) -> Arc<EventPipeline> {
        self.events.clone()
    }

    pub fn stream_gate(&self) -> StreamGate {
        self.stream_gate.clone()
    }

    /// Queue depth on a specific edge, the primary backpressure observable.
    pub fn queue_depth(&self, from: &str, to: &str) -> Option<usize> {
        self.edge_senders
            .get(&(from.to_string(), to.to_string()))
            .map(|s| s.depth())
    }

    /// Stop the runtime: drop the ingress senders so workers drain their
    /// remaining queued messages, then wait up to `grace_period` before
    /// aborting any worker still running.
    pub async fn stop(mut self, grace_period: Duration) {
        self.ingress.clear();
        let deadline = tokio::time::sleep(grace_period);
        tokio::pin!(deadline);
        for worker in &mut self.workers {
            tokio::select! {
                _ = &mut worker.join => {}
                _ = &mut deadline => {
                    worker.join.abort();
                }
            }
        }
    }
}
