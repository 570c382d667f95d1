//! The minimal, provider-agnostic chat contract the planner calls through.
//!
//! This crate is not an LLM client library — concrete provider adapters
//! (OpenAI, Anthropic, Gemini, a local llama.cpp server, ...) are explicitly
//! out of scope (spec.md §1). What lives here is the seam: a trait any
//! stream-capable, JSON-producing chat backend can implement, plus
//! [`crate::mock::MockLlmClient`] for driving the planner deterministically
//! in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Message role in a chat-style prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCall,
    Other(String),
}

/// A request to generate the next planner action (or final answer). `tools`
/// is the catalog (see `penguiflow_core::CatalogEntry`) serialized as plain
/// JSON — this crate has no opinion on how a concrete client renders it into
/// provider-specific tool-calling syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl CallRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: None,
            temperature: 0.0,
            max_tokens: 1024,
            stream: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub content: String,
    pub finish_reason: FinishReason,
}

/// Invoked once per streamed token when `request.stream` is `true`. Not
/// `Send`-bound on its own value — wrapped in `Arc` so planner call sites
/// can clone it alongside the shared chunk emitter it forwards tokens into.
pub type OnChunk = Arc<dyn Fn(&str) + Send + Sync>;

/// The contract any chat-capable backend implements to serve the planner.
///
/// `stream` on the request signals intent; an implementation that cannot
/// stream may ignore `on_chunk` and return the complete `content` in one
/// shot, but should then report `request.stream == false` was effectively
/// honored by still populating `content` in full.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(&self, request: CallRequest, on_chunk: Option<OnChunk>) -> Result<CallResponse>;
}
