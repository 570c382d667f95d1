//! Error type for the `StateStore` / `MessageBus` / `RemoteTransport`
//! protocols.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures a protocol implementation can surface back to the planner or
/// graph runtime.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `load_pause`/`resume` against a token the store has never seen, or
    /// has already expired past its TTL.
    #[error("pause token '{0}' not found or expired")]
    NotFound(String),

    /// The backing store rejected the operation (connection lost, quota
    /// exceeded, etc.). Opaque by design — protocol implementations decide
    /// their own internal error taxonomy.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A `RemoteTransport::invoke` call's deadline elapsed before the
    /// remote node returned.
    #[error("remote invocation of '{0}' timed out")]
    RemoteTimeout(String),

    /// A `RemoteTransport::invoke` call was cancelled by its caller.
    #[error("remote invocation of '{0}' was cancelled")]
    RemoteCancelled(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
