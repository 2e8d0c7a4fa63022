//! Language-model layer for OpenTolk.
//!
//! ## Modules
//!
//! - [`llm`] -- Wire types, the [`ChatModel`] trait and the OpenAI-compatible
//!   client.
//! - [`stream`] -- [`TextStream`], a cancellable channel of text deltas.
//! - [`history`] -- Per-plugin conversation history with idle expiry.
//! - [`runtime`] -- The bounded tool-call loop and the [`ToolAdapter`] trait.
//! - [`error`] -- Agent error types.

pub mod error;
pub mod history;
pub mod llm;
pub mod runtime;
pub mod stream;

pub use error::{AgentError, Result};
pub use history::ConversationHistory;
pub use llm::{
    ChatModel, ChatRequest, LlmClient, LlmClientConfig, LlmResponse, Message, Role, ToolCall,
    ToolDefinition, ToolResult,
};
pub use runtime::{
    AgentConfig, AgentContext, AgentResponse, MAX_TOOL_ROUNDS, TOOL_LIMIT_MESSAGE, ToolAdapter,
    run_tool_loop,
};
pub use stream::{StreamEvent, StreamSender, TextStream};
