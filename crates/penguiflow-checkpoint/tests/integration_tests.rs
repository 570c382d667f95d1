use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use penguiflow_checkpoint::{
    InMemoryMessageBus, InMemoryStateStore, LoopbackTransport, MessageBus, RemoteTransport,
    StateStore,
};
use penguiflow_core::Headers;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn save_then_load_pause_round_trips() {
    let store = InMemoryStateStore::new();
    store
        .save_pause("token-1", json!({"reason": "await_input"}), Duration::from_secs(60))
        .await
        .unwrap();

    let loaded = store.load_pause("token-1").await.unwrap();
    assert_eq!(loaded, Some(json!({"reason": "await_input"})));
}

#[tokio::test]
async fn load_unknown_token_returns_none() {
    let store = InMemoryStateStore::new();
    assert_eq!(store.load_pause("nope").await.unwrap(), None);
}

#[tokio::test]
async fn expired_pause_is_not_returned() {
    let store = InMemoryStateStore::new();
    store
        .save_pause("token-1", json!({"x": 1}), Duration::from_millis(10))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.load_pause("token-1").await.unwrap(), None);
}

#[tokio::test]
async fn save_pause_is_last_write_wins() {
    let store = InMemoryStateStore::new();
    store
        .save_pause("token-1", json!({"v": 1}), Duration::from_secs(60))
        .await
        .unwrap();
    store
        .save_pause("token-1", json!({"v": 2}), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(store.load_pause("token-1").await.unwrap(), Some(json!({"v": 2})));
}

#[tokio::test]
async fn delete_pause_is_idempotent() {
    let store = InMemoryStateStore::new();
    store.delete_pause("never-saved").await.unwrap();
    store
        .save_pause("token-1", json!({"v": 1}), Duration::from_secs(60))
        .await
        .unwrap();
    store.delete_pause("token-1").await.unwrap();
    store.delete_pause("token-1").await.unwrap();
    assert_eq!(store.load_pause("token-1").await.unwrap(), None);
}

#[tokio::test]
async fn event_log_replays_in_append_order() {
    let store = InMemoryStateStore::new();
    store.append_event("trace-1", json!({"seq": 0})).await.unwrap();
    store.append_event("trace-1", json!({"seq": 1})).await.unwrap();

    let events = store.list_events("trace-1").await.unwrap();
    assert_eq!(events, vec![json!({"seq": 0}), json!({"seq": 1})]);
}

#[tokio::test]
async fn message_bus_delivers_to_all_subscribers() {
    let bus = InMemoryMessageBus::new();
    let count_a = Arc::new(AtomicUsize::new(0));
    let count_b = Arc::new(AtomicUsize::new(0));

    let a = count_a.clone();
    bus.subscribe(
        "topic",
        Arc::new(move |_msg: serde_json::Value| {
            a.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .await
    .unwrap();

    let b = count_b.clone();
    bus.subscribe(
        "topic",
        Arc::new(move |_msg: serde_json::Value| {
            b.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .await
    .unwrap();

    bus.publish("topic", json!({"hello": true})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(count_a.load(Ordering::SeqCst), 1);
    assert_eq!(count_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn message_bus_does_not_deliver_to_other_topics() {
    let bus = InMemoryMessageBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    bus.subscribe(
        "topic-a",
        Arc::new(move |_msg: serde_json::Value| {
            c.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .await
    .unwrap();

    bus.publish("topic-b", json!({"hello": true})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn loopback_transport_invokes_handler() {
    let transport = LoopbackTransport::new(|node, input| Ok(json!({"node": node, "echo": input})));
    let headers = Headers::new("tenant-1");
    let result = transport
        .invoke(
            "remote_node",
            json!({"x": 1}),
            &headers,
            "trace-1",
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"node": "remote_node", "echo": {"x": 1}}));
}

#[tokio::test]
async fn loopback_transport_rejects_cancelled_trace() {
    let transport = LoopbackTransport::new(|node, input| Ok(json!({"node": node, "echo": input})));
    let headers = Headers::new("tenant-1");
    let token = CancellationToken::new();
    token.cancel();
    let result = transport
        .invoke("remote_node", json!({"x": 1}), &headers, "trace-1", None, token)
        .await;
    assert!(result.is_err());
}
