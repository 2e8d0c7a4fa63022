//! Adapter error types.
//!
//! All adapter subsystems surface errors through [`AdapterError`].  Each
//! variant carries enough context for callers to decide how to handle the
//! failure without inspecting opaque strings.

/// Unified error type for OpenTolk adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The requested tool does not exist on this adapter.
    #[error("tool not found: `{tool_name}` on adapter `{adapter_id}`")]
    ToolNotFound {
        adapter_id: String,
        tool_name: String,
    },

    /// The parameters supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// A tool invocation or subprocess failed.
    #[error("execution failed for `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// The collaborator backing a tool is not configured.
    #[error("{what} is not available")]
    Unavailable { what: String },

    /// An HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdapterError {
    pub(crate) fn invalid(tool_name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            tool_name: tool_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
