//! Adapters for OpenTolk: subprocesses, HTTP calls and the built-in tools.
//!
//! - [`process`] -- Spawn a program with env, stdin and a hard timeout.
//! - [`http_request`] -- Send one HTTP request and read the response.
//! - [`web_search`], [`desktop`], [`mail`] -- Built-in tool families, each an
//!   [`Adapter`].  Desktop and mail delegate to host collaborators
//!   ([`Desktop`], [`Mailbox`]).

pub mod desktop;
pub mod error;
pub mod http_request;
pub mod mail;
pub mod process;
pub mod traits;
pub mod web_search;

pub use desktop::{CommandDesktop, Desktop, DesktopAdapter, PASTE_TOOL, READ_CLIPBOARD_TOOL};
pub use error::{AdapterError, Result};
pub use http_request::{DEFAULT_HTTP_TIMEOUT, HttpBody, HttpCall, HttpResponse, send_http};
pub use mail::{
    MAIL_LIST_TOOL, MAIL_READ_TOOL, MAIL_SEARCH_TOOL, MAIL_SEND_TOOL, MailAdapter, MailMessage,
    MailSummary, Mailbox, MemoryMailbox, NoMailbox, OutgoingMail,
};
pub use process::{
    DEFAULT_PROCESS_TIMEOUT, MAX_OUTPUT_BYTES, ProcessOutput, ProcessSpec, interpreter_for,
    run_process, truncate_output,
};
pub use traits::{Adapter, ToolDefinition};
pub use web_search::{WEB_SEARCH_TOOL, WebSearchAdapter};
