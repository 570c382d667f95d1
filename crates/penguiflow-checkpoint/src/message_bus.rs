//! The `MessageBus` protocol: at-least-once publish/subscribe, used
//! optionally to bridge flows to remote workers. De-duplication is left to
//! the consumer (key on `trace_id` + `action_seq`, per spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::error::Result;

/// A handler invoked once per message delivered on a subscribed topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value);
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(Value) + Send + Sync,
{
    async fn handle(&self, message: Value) {
        (self)(message)
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `message` to `topic`. At-least-once: a subscriber may see the
    /// same message more than once across retries/redeliveries.
    async fn publish(&self, topic: &str, message: Value) -> Result<()>;

    /// Register `handler` to run for every message published to `topic`
    /// from this point forward.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// Reference `MessageBus` backed by per-topic `tokio::sync::mpsc` fan-out.
/// Every subscriber gets its own relay task, so one slow handler never
/// blocks delivery to the others.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    topics: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<Value>>>>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, message: Value) -> Result<()> {
        let senders = self.topics.read().await.get(topic).cloned().unwrap_or_default();
        for sender in senders {
            // At-least-once: a full subscriber queue drops the message for
            // that subscriber rather than blocking the publisher, matching
            // the reference implementation's best-effort delivery.
            let _ = sender.try_send(message.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<Value>(256);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                handler.handle(message).await;
            }
        });
        Ok(())
    }
}
