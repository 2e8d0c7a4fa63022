//! Execution engine for OpenTolk.
//!
//! A routed [`Match`](opentolk_kernel::Match) is executed by the [`Runner`]
//! through one of five backends and the result handed to the
//! [`OutputDispatcher`].
//!
//! - [`runner`] -- Permission and settings checks, recursion guard, backend
//!   dispatch.
//! - `script`, `http`, `shortcut`, `ai`, `pipeline` -- The backends.
//! - `tools` -- Declared tools exposed to the AI tool loop.
//! - [`output`] -- [`Outcome`], [`RunResult`] and backend output parsing.
//! - [`json_path`] -- Response-path extraction for the HTTP backend.
//! - [`dispatch`] -- Output modes, fallback and side effects.
//! - [`engine`] -- Route, run and deliver in one call.

mod ai;
pub mod dispatch;
pub mod engine;
pub mod error;
mod http;
pub mod json_path;
pub mod output;
mod pipeline;
pub mod runner;
mod script;
mod shortcut;
mod tools;

pub use dispatch::{ConversationView, Delivery, DeliverySink, OutputDispatcher};
pub use engine::Engine;
pub use error::{EngineError, MAX_ERROR_BODY_CHARS, Result};
pub use json_path::{extract_path, select};
pub use output::{OUTPUT_DIRECTIVE, Outcome, RunResult, parse_output};
pub use runner::{
    DEFAULT_SHORTCUT_COMMAND, ENV_DATA_DIR, ENV_INPUT, ENV_PLUGIN_DIR, ENV_RAW_INPUT, ENV_TRIGGER,
    MAX_DEPTH, Runner, RunnerConfig,
};
pub use tools::{ENV_TOOL_ARGS, ENV_TOOL_NAME};
