//! Kernel error types.
//!
//! Routing itself never fails at request time; errors arise only while
//! building a [`Router`](crate::Router) from a set of manifests.

/// Unified error type for the OpenTolk routing kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Router build errors ------------------------------------------------
    /// A trigger pattern failed to compile.
    #[error("invalid pattern `{pattern}` in plugin `{plugin_id}`: {reason}")]
    InvalidPattern {
        plugin_id: String,
        pattern: String,
        reason: String,
    },

    /// More than one enabled manifest declares a catch-all trigger.
    #[error("catch-all conflict: `{first}` and `{second}` are both enabled")]
    CatchAllConflict { first: String, second: String },
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
