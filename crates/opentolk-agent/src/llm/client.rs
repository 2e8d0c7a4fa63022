//! Chat model abstraction and the OpenAI-compatible HTTP client.
//!
//! [`ChatModel`] is the seam the rest of the system talks to. [`LlmClient`]
//! implements it against the Chat Completions API, which also covers
//! compatible servers such as Ollama, vLLM and LM Studio.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::streaming_openai::OpenAiStreamParser;
use crate::llm::types::{ChatRequest, LlmResponse, Message, Role, ToolCall, ToolDefinition};
use crate::stream::{StreamSender, TextStream};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when neither the request nor the configuration names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ---------------------------------------------------------------------------
// ChatModel trait
// ---------------------------------------------------------------------------

/// A language model that can answer chat requests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a request and wait for the complete response.
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse>;

    /// Send a request and receive the answer as a live text stream.
    ///
    /// Requests carrying tools must use [`ChatModel::chat`].
    async fn stream(&self, request: &ChatRequest) -> Result<TextStream>;
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API key. May be empty for local endpoints that need none.
    pub api_key: String,
    /// Base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
    /// Whole-request timeout for non-streaming calls.
    pub timeout: Duration,
}

impl LlmClientConfig {
    /// Configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_compatible(api_key, model, OPENAI_BASE_URL)
    }

    /// Configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            default_model: model.into(),
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Chat Completions API.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client. The hosted OpenAI endpoint requires an API key.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() && config.base_url == OPENAI_BASE_URL {
            return Err(AgentError::MissingApiKey {
                endpoint: config.base_url.clone(),
            });
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Build the JSON body for the Chat Completions API.
    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let model = if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        };

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages_to_openai(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Send the HTTP request to the `/chat/completions` endpoint.
    async fn send_request(&self, body: &Value, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut headers = HeaderMap::new();
        if !self.config.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.config.api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                    reason: format!("invalid authorization header: {e}"),
                })?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], "sending LLM request");

        let mut builder = self.http.post(&url).headers(headers).json(body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.map_err(|e| AgentError::LlmRequestFailed {
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request, false);
        let resp = self.send_request(&body, Some(self.config.timeout)).await?;

        let text = resp.text().await.map_err(|e| AgentError::LlmRequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;
        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        parse_openai_response(&v)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TextStream> {
        let body = self.build_request_body(request, true);
        let resp = self.send_request(&body, None).await?;

        let (sender, stream) = TextStream::channel();
        let task = tokio::spawn(pump_stream(resp, sender));
        Ok(stream.with_producer(task.abort_handle()))
    }
}

/// Forward an SSE response body into a stream sender until `[DONE]`, an
/// error, or the consumer going away.
async fn pump_stream(resp: reqwest::Response, sender: StreamSender) {
    let mut parser = OpenAiStreamParser::new();
    let mut bytes = resp.bytes_stream();

    while let Some(chunk) = bytes.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                sender.fail(format!("stream read error: {e}")).await;
                return;
            }
        };

        let deltas = match parser.feed_chunk(&chunk) {
            Ok(deltas) => deltas,
            Err(e) => {
                sender.fail(e.to_string()).await;
                return;
            }
        };

        for delta in deltas {
            if !sender.delta(delta).await {
                tracing::debug!("stream consumer dropped, abandoning response");
                return;
            }
        }

        if parser.is_done() {
            break;
        }
    }

    // Some compatible servers close the connection without `[DONE]`.
    sender.done().await;
}

// ===========================================================================
// Wire format conversion
// ===========================================================================

/// Convert messages to the Chat Completions format.
///
/// System messages stay in the array, tool calls live in
/// `assistant.tool_calls` with stringified arguments, and tool results use
/// `role: "tool"` with a `tool_call_id`.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::System => json!({ "role": "system", "content": msg.content }),
            Role::User => json!({ "role": "user", "content": msg.content }),
            Role::Assistant if msg.tool_calls.is_empty() => {
                json!({ "role": "assistant", "content": msg.content })
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();

                let mut m = json!({ "role": "assistant", "tool_calls": tool_calls });
                if !msg.content.is_empty() {
                    m["content"] = json!(msg.content);
                }
                m
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.content,
            }),
        })
        .collect()
}

/// Convert tool definitions, wrapping each in `{"type": "function", ...}`.
pub fn tools_to_openai(tools: &[ToolDefinition]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<LlmResponse> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    if let Some(tool_calls) = message["tool_calls"].as_array()
        && !tool_calls.is_empty()
    {
        let calls: Result<Vec<ToolCall>> = tool_calls
            .iter()
            .map(|tc| {
                let func = &tc["function"];
                let name = func["name"].as_str().unwrap_or_default().to_owned();
                let args_str = func["arguments"].as_str().unwrap_or("{}");
                let arguments: Value = if args_str.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(args_str).map_err(|e| AgentError::LlmParseFailed {
                        reason: format!("invalid JSON in tool call `{name}` arguments: {e}"),
                    })?
                };

                Ok(ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_owned(),
                    name,
                    arguments,
                })
            })
            .collect();

        return Ok(LlmResponse::ToolCalls(calls?));
    }

    let content = message["content"].as_str().unwrap_or_default();
    Ok(LlmResponse::Text(content.to_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
