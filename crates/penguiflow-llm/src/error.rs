//! Error type for LLM client calls.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Error, Debug)]
pub enum LlmError {
    /// The provider rejected the request, was unreachable, or returned a
    /// malformed response. Concrete client implementations live outside
    /// this crate; this variant is what they're expected to surface.
    #[error("LLM call failed: {0}")]
    CallFailed(String),

    /// A `stream: true` call was made against a client that doesn't
    /// support streaming.
    #[error("streaming not supported by this client")]
    StreamingUnsupported,
}
