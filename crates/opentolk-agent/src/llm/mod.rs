//! LLM integration layer.
//!
//! - [`types`] -- Core data types (messages, tool calls, requests).
//! - [`client`] -- The [`ChatModel`] trait and the OpenAI-compatible client.
//! - [`streaming_openai`] -- SSE line parser for streamed responses.

pub mod client;
pub mod streaming_openai;
pub mod types;

pub use client::{ChatModel, DEFAULT_MODEL, LlmClient, LlmClientConfig, OPENAI_BASE_URL};
pub use types::{
    ChatRequest, LlmResponse, Message, Role, ToolCall, ToolDefinition, ToolResult,
};
