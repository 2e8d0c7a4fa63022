//! Error types for the plugin subsystem.

use std::path::PathBuf;

/// Plugin-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The manifest decoded but violates a structural rule.
    #[error("invalid manifest `{id}`: {reason}")]
    InvalidManifest { id: String, reason: String },

    /// The manifest file could not be decoded at all.
    #[error("malformed manifest at `{path}`: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("plugin not found: `{0}`")]
    NotFound(String),

    #[error("plugin `{0}` is already installed")]
    AlreadyInstalled(String),

    /// Only one catch-all plugin may be enabled at a time.
    #[error("cannot enable `{requested}`: catch-all plugin `{enabled}` is already enabled")]
    CatchAllConflict { enabled: String, requested: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    pub(crate) fn invalid(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PluginError>;
