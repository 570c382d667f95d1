//! A deterministic [`LlmClient`] for driving the planner in tests without a
//! real provider.
//!
//! [`MockLlmClient`] plays back a fixed script of responses, one per call,
//! in order. This is the shape the planner's own test suite (and anyone
//! else exercising a flow without network access) needs: scripted
//! "reasoning" steps that deterministically walk a ReAct loop through
//! sequential actions, parallel fan-out, a malformed-JSON-then-repair
//! step, and a final answer.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CallRequest, CallResponse, FinishReason, LlmClient, OnChunk};
use crate::error::{LlmError, Result};

/// Plays back a fixed list of responses, one per `call`, in order.
///
/// Calling past the end of the script returns [`LlmError::CallFailed`] —
/// a test that exhausts its script has a bug in either the script or the
/// code under test, and a silent repeat of the last response would hide it.
pub struct MockLlmClient {
    script: Mutex<Vec<CallResponse>>,
}

impl MockLlmClient {
    pub fn new(script: Vec<CallResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().rev().collect()),
        }
    }

    /// Convenience constructor for scripting raw content strings with
    /// `FinishReason::Stop`, the common case for planner action JSON.
    pub fn with_responses(contents: Vec<impl Into<String>>) -> Self {
        Self::new(
            contents
                .into_iter()
                .map(|content| CallResponse {
                    content: content.into(),
                    finish_reason: FinishReason::Stop,
                })
                .collect(),
        )
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn call(&self, request: CallRequest, on_chunk: Option<OnChunk>) -> Result<CallResponse> {
        let response = {
            let mut script = self.script.lock().expect("mock script mutex poisoned");
            script
                .pop()
                .ok_or_else(|| LlmError::CallFailed("mock script exhausted".to_string()))?
        };

        if request.stream {
            if let Some(on_chunk) = on_chunk {
                on_chunk(&response.content);
            }
        }

        Ok(response)
    }
}
