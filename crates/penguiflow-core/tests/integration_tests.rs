use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use penguiflow_core::{Emission, Envelope, GraphBuilder, Headers, Node, Policy, RuntimeBuilder};
use serde_json::json;

fn passthrough(name: &str) -> Node {
    let name = name.to_string();
    Node::new(
        name.clone(),
        name,
        Arc::new(move |payload, _ctx| Box::pin(async move { Ok(Emission::all(payload)) })),
    )
}

#[tokio::test]
async fn linear_pipeline_delivers_to_egress() {
    let graph = GraphBuilder::new()
        .add_node(passthrough("a"))
        .unwrap()
        .add_node(passthrough("b"))
        .unwrap()
        .add_edge("a", "b", 8)
        .with_entry("a")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    runtime
        .submit("a", Envelope::new(json!({"value": 1}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let result = runtime.recv().await.expect("egress delivers a result");
    assert_eq!(result.payload, json!({"value": 1}));
}

#[tokio::test]
async fn parallel_fan_out_and_join_combines_both_branches() {
    let join_counter = Arc::new(AtomicUsize::new(0));
    let counter_for_join = join_counter.clone();

    let split = Node::new(
        "split",
        "split",
        Arc::new(|payload, _ctx| {
            Box::pin(async move { Ok(Emission::all(payload)) })
        }),
    );
    let left = passthrough("left");
    let right = passthrough("right");
    let join = Node::new(
        "join",
        "join",
        Arc::new(move |payload, _ctx| {
            let counter = counter_for_join.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Emission::all(payload))
            })
        }),
    );

    let graph = GraphBuilder::new()
        .add_node(split)
        .unwrap()
        .add_node(left)
        .unwrap()
        .add_node(right)
        .unwrap()
        .add_node(join)
        .unwrap()
        .add_edge("split", "left", 8)
        .add_edge("split", "right", 8)
        .add_edge("left", "join", 8)
        .add_edge("right", "join", 8)
        .with_entry("split")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    runtime
        .submit("split", Envelope::new(json!({"n": 1}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let first = runtime.recv().await.expect("first branch reaches egress");
    let second = runtime.recv().await.expect("second branch reaches egress");
    assert_eq!(first.payload, json!({"n": 1}));
    assert_eq!(second.payload, json!({"n": 1}));
    assert_eq!(join_counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_node_without_retries_surfaces_node_error_and_drops_message() {
    let flaky = Node::new(
        "flaky",
        "flaky",
        Arc::new(|_payload, _ctx| {
            Box::pin(async move { Err(penguiflow_core::GraphError::Custom("boom".into())) })
        }),
    )
    .with_policy(Policy::new().with_max_retries(0));

    let graph = GraphBuilder::new()
        .add_node(flaky)
        .unwrap()
        .with_entry("flaky")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    runtime
        .submit("flaky", Envelope::new(json!({}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), runtime.recv()).await;
    assert!(result.is_err(), "a failed node with no retries must not reach egress");
}

#[tokio::test]
async fn node_retries_until_success_within_max_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let eventually_ok = Node::new(
        "eventually_ok",
        "eventually_ok",
        Arc::new(move |payload, _ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(penguiflow_core::GraphError::Custom("not yet".into()))
                } else {
                    Ok(Emission::all(payload))
                }
            })
        }),
    )
    .with_policy(
        Policy::new()
            .with_max_retries(5)
            .with_backoff(Duration::from_millis(1), 1.0, Duration::from_millis(5)),
    );

    let graph = GraphBuilder::new()
        .add_node(eventually_ok)
        .unwrap()
        .with_entry("eventually_ok")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    runtime
        .submit("eventually_ok", Envelope::new(json!({"ok": true}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let result = runtime.recv().await.expect("eventually succeeds");
    assert_eq!(result.payload, json!({"ok": true}));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelling_a_trace_stops_it_from_reaching_egress() {
    let slow = Node::new(
        "slow",
        "slow",
        Arc::new(|payload, ctx| {
            Box::pin(async move {
                loop {
                    if ctx.is_cancelled().await {
                        return Err(penguiflow_core::GraphError::cancelled(ctx.trace_id()));
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    let _ = &payload;
                }
            })
        }),
    );

    let graph = GraphBuilder::new()
        .add_node(slow)
        .unwrap()
        .with_entry("slow")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    let envelope = Envelope::new(json!({}), Headers::new("tenant-1")).with_trace_id("trace-cancel-me");
    runtime.submit("slow", envelope).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    runtime.cancel_trace("trace-cancel-me").await;

    let result = tokio::time::timeout(Duration::from_millis(500), runtime.recv()).await;
    assert!(result.is_err(), "a cancelled trace must never reach egress");
}

#[test]
fn graph_builder_rejects_cycles_without_allow_cycle() {
    let graph = GraphBuilder::new()
        .add_node(passthrough("a"))
        .unwrap()
        .add_node(passthrough("b"))
        .unwrap()
        .add_edge("a", "b", 8)
        .add_edge("b", "a", 8)
        .with_entry("a")
        .build();

    assert!(graph.is_err());
}

#[test]
fn graph_builder_accepts_cycles_with_allow_cycle() {
    let looping = passthrough("loop").allow_cycle();
    let exit = passthrough("exit");
    let graph = GraphBuilder::new()
        .add_node(looping)
        .unwrap()
        .add_node(exit)
        .unwrap()
        .add_edge("loop", "loop", 8)
        .add_edge("loop", "exit", 8)
        .with_entry("loop")
        .build();

    assert!(graph.is_ok());
}

#[test]
fn graph_builder_rejects_a_cycle_with_no_path_to_egress() {
    let looping = passthrough("loop").allow_cycle();
    let graph = GraphBuilder::new()
        .add_node(looping)
        .unwrap()
        .add_edge("loop", "loop", 8)
        .with_entry("loop")
        .build();

    assert!(
        graph.is_err(),
        "a node whose only successor is itself can never reach egress"
    );
}

#[test]
fn emission_targeting_an_undeclared_successor_errors() {
    let emission = Emission::to(["not-a-successor"], json!({}));
    let result = emission.resolve(&["real-successor".to_string()]);
    assert!(result.is_err());
}

#[tokio::test]
async fn routing_policy_narrows_broadcast_emission() {
    let split = Node::new(
        "split",
        "split",
        Arc::new(|payload, _ctx| Box::pin(async move { Ok(Emission::all(payload)) })),
    );
    let left = passthrough("left");
    let right = passthrough("right");

    let graph = GraphBuilder::new()
        .add_node(split)
        .unwrap()
        .add_node(left)
        .unwrap()
        .add_node(right)
        .unwrap()
        .add_edge("split", "left", 8)
        .add_edge("split", "right", 8)
        .with_entry("split")
        .build()
        .unwrap();

    let policy: penguiflow_core::RoutingPolicy = Arc::new(|_headers, _payload, targets| {
        targets.iter().filter(|t| *t == "left").cloned().collect()
    });

    let mut runtime = RuntimeBuilder::new(graph).with_routing_policy(policy).spawn();
    runtime
        .submit("split", Envelope::new(json!({"n": 1}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let only = tokio::time::timeout(Duration::from_millis(200), runtime.recv())
        .await
        .expect("the policy-permitted branch reaches egress")
        .unwrap();
    assert_eq!(only.payload, json!({"n": 1}));

    let second = tokio::time::timeout(Duration::from_millis(100), runtime.recv()).await;
    assert!(second.is_err(), "the filtered-out branch must never reach egress");
}

#[tokio::test]
async fn configured_error_sink_receives_routed_failures() {
    let flaky = Node::new(
        "flaky",
        "flaky",
        Arc::new(|_payload, _ctx| {
            Box::pin(async move { Err(penguiflow_core::GraphError::Custom("boom".into())) })
        }),
    )
    .with_policy(Policy::new().with_max_retries(0));
    let sink = passthrough("sink");

    let graph = GraphBuilder::new()
        .add_node(flaky)
        .unwrap()
        .add_node(sink)
        .unwrap()
        .with_entry("flaky")
        .with_error_sink("sink")
        .build()
        .unwrap();

    let mut runtime = RuntimeBuilder::new(graph).spawn();
    runtime
        .submit("flaky", Envelope::new(json!({}), Headers::new("tenant-1")))
        .await
        .unwrap();

    let routed = runtime
        .recv()
        .await
        .expect("the error sink's own broadcast reaches egress");
    assert_eq!(routed.payload["node_id"], json!("flaky"));
    assert_eq!(routed.payload["error_class"], json!("custom"));
}

#[tokio::test]
async fn call_playbook_forwards_parent_trace_id() {
    use penguiflow_core::patterns::call_playbook;
    use penguiflow_core::{CancellationRegistry, Context, ContextCore, ToolContext};

    let child_graph = GraphBuilder::new()
        .add_node(passthrough("child"))
        .unwrap()
        .with_entry("child")
        .build()
        .unwrap();
    let mut child_runtime = RuntimeBuilder::new(child_graph).spawn();

    let cancellation = CancellationRegistry::new();
    let parent_envelope =
        Envelope::new(json!({}), Headers::new("tenant-1")).with_trace_id("trace-parent");
    let core = ContextCore::new(&parent_envelope, cancellation.clone());
    let parent_ctx = Context::Tool(ToolContext {
        core,
        branch_index: None,
    });

    let result = call_playbook(
        &mut child_runtime,
        "child-playbook",
        "child",
        json!({"x": 1}),
        &parent_ctx,
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"x": 1}));
}

#[tokio::test]
async fn call_playbook_propagates_parent_cancellation_to_the_child() {
    use penguiflow_core::patterns::call_playbook;
    use penguiflow_core::{CancellationRegistry, Context, ContextCore, ToolContext};

    let slow_child = Node::new(
        "child",
        "child",
        Arc::new(|_payload, ctx| {
            Box::pin(async move {
                loop {
                    if ctx.is_cancelled().await {
                        return Err(penguiflow_core::GraphError::cancelled(ctx.trace_id()));
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        }),
    );
    let child_graph = GraphBuilder::new()
        .add_node(slow_child)
        .unwrap()
        .with_entry("child")
        .build()
        .unwrap();
    let mut child_runtime = RuntimeBuilder::new(child_graph).spawn();

    let cancellation = CancellationRegistry::new();
    let parent_envelope =
        Envelope::new(json!({}), Headers::new("tenant-1")).with_trace_id("trace-parent-2");
    let core = ContextCore::new(&parent_envelope, cancellation.clone());
    let parent_ctx = Context::Tool(ToolContext {
        core,
        branch_index: None,
    });

    cancellation.cancel("trace-parent-2").await;

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        call_playbook(&mut child_runtime, "child-playbook", "child", json!({}), &parent_ctx),
    )
    .await
    .expect("call_playbook must not hang when the parent trace is already cancelled");

    assert!(matches!(result, Err(penguiflow_core::GraphError::Cancelled { .. })));
}

#[tokio::test]
async fn map_concurrent_preserves_input_order_under_bounded_concurrency() {
    use penguiflow_core::patterns::map_concurrent;

    let items: Vec<Value> = (0..8).map(|n| json!(n)).collect();
    let results = map_concurrent(items, 3, |index, item| async move {
        // Reverse-order sleeps so later items finish first, proving the
        // result order follows input index, not completion order.
        tokio::time::sleep(Duration::from_millis((8 - index) as u64)).await;
        Ok(json!(item.as_i64().unwrap() * 10))
    })
    .await
    .unwrap();

    let expected: Vec<Value> = (0..8).map(|n| json!(n * 10)).collect();
    assert_eq!(results, expected);
}

#[tokio::test]
async fn map_concurrent_attributes_failure_to_its_item_index() {
    use penguiflow_core::patterns::map_concurrent;

    let items: Vec<Value> = (0..5).map(|n| json!(n)).collect();
    let result = map_concurrent(items, 4, |index, item| async move {
        if index == 2 {
            Err(penguiflow_core::GraphError::Custom("boom".to_string()))
        } else {
            Ok(item)
        }
    })
    .await;

    match result {
        Err(penguiflow_core::GraphError::MapItem { index, .. }) => assert_eq!(index, 2),
        other => panic!("expected MapItem{{index: 2, ..}}, got {other:?}"),
    }
}

#[tokio::test]
async fn worker_emission_send_is_cancellable_when_downstream_floe_is_full() {
    use penguiflow_core::{floe, CancellationRegistry, EventPipeline, SchemaRegistryBuilder, Successors};

    let (inbound_tx, inbound_rx) = floe("ingress", "producer", 8);
    let (succ_tx, succ_rx) = floe("producer", "sink", 1);

    // Fill the one-slot successor floe so the worker's emission send has
    // nowhere to go and must suspend.
    succ_tx
        .send(Envelope::new(json!({"filler": true}), Headers::new("tenant-1")))
        .await
        .unwrap();
    // Keep `succ_rx` alive (never drained) so the floe stays full and open.
    let _keep_open = succ_rx;

    let successors = Successors {
        senders: [("sink".to_string(), succ_tx)].into_iter().collect(),
    };
    let registry = SchemaRegistryBuilder::new().build().unwrap();
    let events = Arc::new(EventPipeline::default());
    let cancellation = CancellationRegistry::new();
    let (chunk_tx, _chunk_rx) = tokio::sync::mpsc::channel(8);

    let handle = penguiflow_core::spawn_worker(
        passthrough("producer"),
        inbound_rx,
        successors,
        registry,
        events,
        cancellation.clone(),
        chunk_tx,
        None,
        None,
    );

    let envelope =
        Envelope::new(json!({"n": 1}), Headers::new("tenant-1")).with_trace_id("blocked-trace");
    inbound_tx.send(envelope).await.unwrap();

    // Give the worker time to reach (and suspend on) the full successor send.
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancellation.cancel("blocked-trace").await;

    let result = tokio::time::timeout(Duration::from_millis(300), handle.join).await;
    assert!(
        result.is_ok(),
        "cancelling the trace must unblock a worker suspended on a full downstream floe"
    );
}

#[tokio::test]
async fn middleware_shed_event_is_delivered_to_other_observers_when_one_times_out() {
    use async_trait::async_trait;
    use penguiflow_core::{Event, EventPipeline, Middleware};
    use tokio::sync::Mutex as TokioMutex;

    struct SlowObserver;
    #[async_trait]
    impl Middleware for SlowObserver {
        fn name(&self) -> &str {
            "slow"
        }
        async fn on_event(&self, _event: &Event) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    struct RecordingObserver {
        seen: Arc<TokioMutex<Vec<Event>>>,
    }
    #[async_trait]
    impl Middleware for RecordingObserver {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn on_event(&self, event: &Event) {
            self.seen.lock().await.push(event.clone());
        }
    }

    let seen = Arc::new(TokioMutex::new(Vec::new()));
    let mut pipeline = EventPipeline::new(Duration::from_millis(10));
    pipeline.register(Arc::new(SlowObserver));
    pipeline.register(Arc::new(RecordingObserver { seen: seen.clone() }));

    pipeline
        .dispatch(Event::Cancelled {
            trace_id: "t1".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .await;

    let recorded = seen.lock().await;
    assert!(
        recorded
            .iter()
            .any(|e| matches!(e, Event::MiddlewareShed { observer, .. } if observer == "slow")),
        "expected a MiddlewareShed event delivered to the other observer, got {recorded:?}"
    );
}

#[test]
fn is_describable_reflects_registered_schemas() {
    use penguiflow_core::catalog::is_describable;
    use penguiflow_core::SchemaRegistryBuilder;

    let registry = SchemaRegistryBuilder::new()
        .with_schemas("documented", Some(json!({"type": "object"})), None)
        .build()
        .unwrap();

    assert!(is_describable(&registry, "documented"));
    assert!(!is_describable(&registry, "undocumented"));
}
