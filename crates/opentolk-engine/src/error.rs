//! Engine error types.
//!
//! Every failure a plugin execution can end in surfaces as a specific
//! [`EngineError`] variant, so callers can decide how to react (fall back to
//! pasting the raw text, show a notification, ...) without parsing strings.

use opentolk_adapters::AdapterError;
use opentolk_agent::AgentError;
use opentolk_plugins::{Capability, OutputMode, PluginError};

/// Longest response body carried in [`EngineError::HttpFailed`].
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Unified error type for plugin execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Backend failures ---------------------------------------------------
    /// A subprocess or HTTP call exceeded its time limit.
    #[error("{what} timed out after {seconds}s")]
    Timeout { seconds: u64, what: String },

    /// A subprocess exited with a non-zero status.
    #[error("process exited with code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    /// An HTTP backend received a non-2xx response.
    #[error("http request failed with status {status}: {body}")]
    HttpFailed { status: u16, body: String },

    /// A value the backend needs (URL, command, prompt, model, ...) is absent.
    #[error("plugin `{plugin_id}` is missing required configuration `{field}`")]
    MissingRequiredConfig { plugin_id: String, field: String },

    /// A tool name that no declared tool answers to.
    #[error("unknown tool: `{name}`")]
    UnknownTool { name: String },

    /// The backend produced output that could not be interpreted.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    // -- Orchestration failures ---------------------------------------------
    /// A pipeline step names a plugin that is not installed.
    #[error("pipeline step target not found: `{id}`")]
    PipelineTargetNotFound { id: String },

    /// A pipeline step failed; the whole pipeline is aborted.
    #[error("pipeline `{pipeline_id}` failed at step {step}: {source}")]
    PipelineStepFailed {
        pipeline_id: String,
        step: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// The plugin declares a capability that has not been granted.
    #[error("plugin `{plugin_id}` has not been granted the `{capability}` permission")]
    PermissionDenied {
        plugin_id: String,
        capability: Capability,
    },

    /// Nested pipeline / `run_plugin` invocations went too deep.
    #[error("plugin nesting exceeded {depth} levels")]
    RecursionLimit { depth: usize },

    /// Neither the primary nor the fallback output mode could deliver.
    #[error("delivery via `{mode}` failed: {reason}")]
    DeliveryFailed { mode: OutputMode, reason: String },

    // -- Wrapped errors -----------------------------------------------------
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The innermost failure, looking through pipeline step wrappers.
    pub fn root_cause(&self) -> &EngineError {
        let mut current = self;
        while let Self::PipelineStepFailed { source, .. } = current {
            current = source;
        }
        current
    }

    pub(crate) fn missing(plugin_id: &str, field: &str) -> Self {
        Self::MissingRequiredConfig {
            plugin_id: plugin_id.to_string(),
            field: field.to_string(),
        }
    }

    /// Build an [`EngineError::HttpFailed`], truncating the body.
    pub(crate) fn http_failed(status: u16, body: &str) -> Self {
        Self::HttpFailed {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    /// Map a subprocess/HTTP adapter error, turning timeouts into
    /// [`EngineError::Timeout`] labelled with `what`.
    pub(crate) fn from_adapter(err: AdapterError, what: impl Into<String>) -> Self {
        match err {
            AdapterError::Timeout { seconds, .. } => Self::Timeout {
                seconds,
                what: what.into(),
            },
            other => Self::Adapter(other),
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
