//! # penguiflow-llm — the chat protocol PenguiFlow's planner calls through
//!
//! This crate is deliberately thin: a [`LlmClient`] trait, the message and
//! request/response types it speaks, and a deterministic [`MockLlmClient`]
//! for tests. Concrete provider adapters (OpenAI, Anthropic, Gemini, a
//! local llama.cpp server, ...) are explicitly out of scope — see
//! spec.md §1. Anything that can produce JSON-shaped chat completions,
//! optionally streamed token-by-token, can implement [`LlmClient`] and
//! plug straight into `penguiflow_planner`.

pub mod client;
pub mod error;
pub mod mock;

pub use client::{CallRequest, CallResponse, ChatMessage, FinishReason, LlmClient, OnChunk, Role};
pub use error::{LlmError, Result};
pub use mock::MockLlmClient;
