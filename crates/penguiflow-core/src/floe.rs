//! Floes: directed, bounded-queue edges between nodes.

use crate::envelope::Envelope;
use tokio::sync::mpsc;

/// Default queue capacity for a floe that doesn't specify one.
pub const DEFAULT_CAPACITY: usize = 64;

/// The sending half of a floe. Cloned for fan-out (multiple source nodes
/// writing into the same edge is not supported — exactly one producer and
/// one consumer per floe — but the sender handle itself is `Clone` so the
/// worker loop can hold one per successor).
#[derive(Clone)]
pub struct FloeSender {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) tx: mpsc::Sender<Envelope>,
}

impl FloeSender {
    /// Send a message, suspending when the queue is full (backpressure).
    pub async fn send(&self, envelope: Envelope) -> Result<(), crate::error::GraphError> {
        self.tx
            .send(envelope)
            .await
            .map_err(|_| crate::error::GraphError::topology(format!(
                "floe {}->{} closed", self.from, self.to
            )))
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Current number of buffered messages — the runtime's primary
    /// backpressure signal, exposed read-only via `queue_depth`.
    pub fn depth(&self) -> usize {
        self.max_capacity() - self.capacity()
    }
}

/// The receiving half of a floe. Owned by exactly one worker — fan-out is
/// implemented as multiple distinct floes, never multiple consumers of one.
pub struct FloeReceiver {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) rx: mpsc::Receiver<Envelope>,
}

impl FloeReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn edge(&self) -> (&str, &str) {
        (&self.from, &self.to)
    }
}

/// Construct a bounded floe between `from` and `to` with the given
/// capacity.
pub fn floe(from: impl Into<String>, to: impl Into<String>, capacity: usize) -> (FloeSender, FloeReceiver) {
    let from = from.into();
    let to = to.into();
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FloeSender {
            from: from.clone(),
            to: to.clone(),
            tx,
        },
        FloeReceiver { from, to, rx },
    )
}
