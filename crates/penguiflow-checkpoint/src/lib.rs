//! # penguiflow-checkpoint — durable-storage protocols for PenguiFlow
//!
//! This crate carries the three protocol traits spec §6 requires plus an
//! in-memory reference implementation of each, sufficient for tests and
//! single-process deployments:
//!
//! - **[`StateStore`]** — durable pause/resume records and optional
//!   per-trace event replay. This is what makes `penguiflow_planner::pause`
//!   and `::resume` durable across process restarts.
//! - **[`MessageBus`]** — at-least-once publish/subscribe, used to bridge
//!   flows onto remote workers.
//! - **[`RemoteTransport`]** — invoke a node living in another process,
//!   with cancellation and deadline propagation.
//!
//! Concrete production backends (Postgres, Redis, a real message broker,
//! ...) are out of scope for this crate — see spec.md §1. What's here is
//! the seam a real backend plugs into, plus enough of a reference
//! implementation to run the planner's pause/resume tests without one.

pub mod error;
pub mod message_bus;
pub mod remote_transport;
pub mod state_store;

pub use error::{Result, StoreError};
pub use message_bus::{InMemoryMessageBus, MessageBus, MessageHandler};
pub use remote_transport::{LoopbackTransport, RemoteTransport};
pub use state_store::{InMemoryStateStore, StateStore};
