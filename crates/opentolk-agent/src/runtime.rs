//! Bounded tool-call loop.
//!
//! The model receives the conversation plus tool definitions. When it asks
//! for tools, each call runs in the order given and its outcome, success or
//! failure, is appended as a `tool` message before the next round. The loop
//! ends when the model answers with text or the round limit is reached.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::llm::ChatModel;
use crate::llm::types::{ChatRequest, LlmResponse, Message, ToolCall, ToolDefinition, ToolResult};

/// Safety cap on model round trips in one loop.
pub const MAX_TOOL_ROUNDS: u32 = 10;

/// Answer returned when the round cap is hit before a final text response.
pub const TOOL_LIMIT_MESSAGE: &str =
    "I stopped after reaching the tool-call limit without a final answer. Try a more specific request.";

// ---------------------------------------------------------------------------
// Tool adapter trait
// ---------------------------------------------------------------------------

/// A component that executes tool calls on behalf of the loop.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn adapter_id(&self) -> &str;

    /// Tools this adapter exposes to the model.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a named tool. Errors are reported back to the model as text.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Agent context
// ---------------------------------------------------------------------------

/// Configuration for the tool loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_rounds: u32,
    /// Model identifier; empty uses the client's default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: MAX_TOOL_ROUNDS,
            model: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// State for a single loop invocation.
pub struct AgentContext {
    pub task_id: Uuid,
    pub messages: Vec<Message>,
    pub adapters: Vec<Arc<dyn ToolAdapter>>,
    pub llm: Arc<dyn ChatModel>,
    pub config: AgentConfig,
}

impl AgentContext {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        adapters: Vec<Arc<dyn ToolAdapter>>,
        config: AgentConfig,
    ) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            messages: Vec::new(),
            adapters,
            llm,
            config,
        }
    }

    /// Put a system prompt at the head of the conversation.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(prompt));
        self
    }

    /// Append prior conversation turns.
    pub fn with_history(mut self, history: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(history);
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    fn all_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.adapters
            .iter()
            .flat_map(|a| a.tool_definitions())
            .collect()
    }

    fn find_adapter_for_tool(&self, tool_name: &str) -> Option<&Arc<dyn ToolAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.tool_definitions().iter().any(|td| td.name == tool_name))
    }
}

// ---------------------------------------------------------------------------
// Agent response
// ---------------------------------------------------------------------------

/// The final outcome of a loop.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub rounds_used: u32,
    /// `true` when the loop stopped at the round cap.
    pub limit_reached: bool,
    pub task_id: Uuid,
}

// ---------------------------------------------------------------------------
// Tool loop
// ---------------------------------------------------------------------------

/// Run the tool loop until the model answers with text or the cap is hit.
///
/// Hitting the cap is not an error: the response carries
/// [`TOOL_LIMIT_MESSAGE`] with `limit_reached` set. Model request failures
/// propagate; tool failures never do.
pub async fn run_tool_loop(ctx: &mut AgentContext) -> Result<AgentResponse> {
    let tools = ctx.all_tool_definitions();
    let task_id = ctx.task_id;
    let max_rounds = ctx.config.max_rounds;

    tracing::info!(
        task_id = %task_id,
        max_rounds,
        tool_count = tools.len(),
        "starting tool loop"
    );

    for round in 0..max_rounds {
        let request = ChatRequest {
            model: ctx.config.model.clone(),
            messages: ctx.messages.clone(),
            tools: tools.clone(),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
        };

        match ctx.llm.chat(&request).await? {
            LlmResponse::Text(text) => {
                tracing::info!(task_id = %task_id, rounds = round + 1, "tool loop finished");
                ctx.messages.push(Message::assistant(&text));
                return Ok(AgentResponse {
                    text,
                    rounds_used: round + 1,
                    limit_reached: false,
                    task_id,
                });
            }

            LlmResponse::ToolCalls(calls) => {
                tracing::info!(
                    task_id = %task_id,
                    round,
                    tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    "model requested tool calls"
                );

                ctx.messages.push(Message::assistant_tool_calls(calls.clone()));
                for result in execute_tool_calls(&calls, ctx).await {
                    ctx.messages
                        .push(Message::tool_result(result.tool_call_id, result.content));
                }
            }
        }
    }

    tracing::warn!(task_id = %task_id, max_rounds, "tool loop hit round limit");
    Ok(AgentResponse {
        text: TOOL_LIMIT_MESSAGE.to_string(),
        rounds_used: max_rounds,
        limit_reached: true,
        task_id,
    })
}

/// Execute tool calls one after another, in the order the model listed
/// them, folding every failure into the result text.
async fn execute_tool_calls(calls: &[ToolCall], ctx: &AgentContext) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(calls.len());

    for call in calls {
        let outcome = match ctx.find_adapter_for_tool(&call.name) {
            Some(adapter) => {
                tracing::debug!(tool = %call.name, id = %call.id, "executing tool");
                adapter.execute(&call.name, call.arguments.clone()).await
            }
            None => Err(AgentError::UnknownTool {
                tool_name: call.name.clone(),
            }),
        };

        results.push(match outcome {
            Ok(content) => ToolResult {
                tool_call_id: call.id.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool execution failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        });
    }

    results
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
