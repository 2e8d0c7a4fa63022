//! Core adapter trait and supporting types.
//!
//! Every built-in tool family (web search, desktop, mail) implements the
//! [`Adapter`] trait, giving the engine a uniform way to describe tools to a
//! model and to execute the calls it makes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdapterError, Result};

/// A tool exposed by an adapter that a model can invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Machine-readable tool name (e.g. `web_search`, `mail_send`).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: Value,
}

/// The universal adapter interface.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Return the unique identifier for this adapter instance.
    fn id(&self) -> &str;

    /// Return the list of tools this adapter exposes.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Execute a named tool with the given JSON parameters.
    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value>;

    /// Look up one of this adapter's tool definitions by name.
    fn tool(&self, name: &str) -> Option<ToolDefinition> {
        self.tools().into_iter().find(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(params: &'a Value, tool: &str, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::invalid(tool, format!("missing required string field `{field}`")))
}

pub(crate) fn optional_usize(params: &Value, field: &str, default: usize) -> usize {
    params
        .get(field)
        .and_then(Value::as_u64)
        .map_or(default, |v| v as usize)
}

pub(crate) fn not_found(adapter_id: &str, tool_name: &str) -> AdapterError {
    AdapterError::ToolNotFound {
        adapter_id: adapter_id.to_string(),
        tool_name: tool_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn required_str_reports_missing_field() {
        let err = required_str(&json!({}), "mail_read", "id").unwrap_err();
        assert!(err.to_string().contains("`id`"));
        assert_eq!(required_str(&json!({"id": "7"}), "mail_read", "id").unwrap(), "7");
    }

    #[test]
    fn optional_usize_falls_back() {
        assert_eq!(optional_usize(&json!({"limit": 3}), "limit", 10), 3);
        assert_eq!(optional_usize(&json!({"limit": "x"}), "limit", 10), 10);
    }
}
