//! Desktop adapter -- the `read_clipboard` and `paste` built-in tools.
//!
//! The actual clipboard and keystroke plumbing belongs to the host shell and
//! sits behind the [`Desktop`] trait.  [`CommandDesktop`] implements it by
//! running user-configured commands (`pbpaste`, `wl-paste`, `xdotool`, ...).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::process::{ProcessSpec, run_process};
use crate::traits::{Adapter, ToolDefinition, not_found, required_str};

pub const READ_CLIPBOARD_TOOL: &str = "read_clipboard";
pub const PASTE_TOOL: &str = "paste";

/// Host-side clipboard and paste collaborator.
#[async_trait]
pub trait Desktop: Send + Sync {
    /// Current clipboard text.
    async fn read_clipboard(&self) -> Result<String>;

    /// Insert `text` into the frontmost application.
    async fn paste(&self, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Command-backed desktop
// ---------------------------------------------------------------------------

/// Timeout for clipboard helper commands.
const DESKTOP_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Desktop`] driven by shell commands.
///
/// `read_clipboard` prints the clipboard on stdout; `paste` receives the
/// text on stdin.  An unset command makes that operation unavailable.
#[derive(Debug, Clone, Default)]
pub struct CommandDesktop {
    read_clipboard: Option<String>,
    paste: Option<String>,
}

impl CommandDesktop {
    #[must_use]
    pub fn new(read_clipboard: Option<String>, paste: Option<String>) -> Self {
        Self {
            read_clipboard: read_clipboard.filter(|c| !c.trim().is_empty()),
            paste: paste.filter(|c| !c.trim().is_empty()),
        }
    }

    async fn run(command: &str, stdin: Option<&str>) -> Result<String> {
        let mut spec = ProcessSpec::shell(command).with_timeout(DESKTOP_COMMAND_TIMEOUT);
        if let Some(input) = stdin {
            spec = spec.with_stdin(input);
        }
        let output = run_process(&spec).await?;
        if !output.success() {
            return Err(AdapterError::ExecutionFailed {
                tool_name: command.to_string(),
                reason: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Desktop for CommandDesktop {
    async fn read_clipboard(&self) -> Result<String> {
        let command = self.read_clipboard.as_deref().ok_or_else(|| AdapterError::Unavailable {
            what: "clipboard".into(),
        })?;
        Self::run(command, None).await
    }

    async fn paste(&self, text: &str) -> Result<()> {
        let command = self.paste.as_deref().ok_or_else(|| AdapterError::Unavailable {
            what: "paste".into(),
        })?;
        Self::run(command, Some(text)).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Exposes a [`Desktop`] as tools.
pub struct DesktopAdapter {
    desktop: Arc<dyn Desktop>,
}

impl DesktopAdapter {
    pub fn new(desktop: Arc<dyn Desktop>) -> Self {
        Self { desktop }
    }
}

#[async_trait]
impl Adapter for DesktopAdapter {
    fn id(&self) -> &str {
        "desktop"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: READ_CLIPBOARD_TOOL.into(),
                description: "Read the current text content of the clipboard.".into(),
                parameters: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: PASTE_TOOL.into(),
                description: "Paste text into the active application.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Text to paste" }
                    },
                    "required": ["text"]
                }),
            },
        ]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            READ_CLIPBOARD_TOOL => {
                let text = self.desktop.read_clipboard().await?;
                debug!(len = text.len(), "clipboard read");
                Ok(Value::String(text))
            }
            PASTE_TOOL => {
                let text = required_str(&params, name, "text")?;
                self.desktop.paste(text).await?;
                Ok(json!({ "pasted": true, "length": text.chars().count() }))
            }
            _ => Err(not_found(self.id(), name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_desktop_reads_clipboard_from_stdout() {
        let desktop = CommandDesktop::new(Some("printf copied".into()), None);
        assert_eq!(desktop.read_clipboard().await.unwrap(), "copied");
    }

    #[tokio::test]
    async fn command_desktop_pastes_via_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("pasted.txt");
        let desktop = CommandDesktop::new(None, Some(format!("cat > '{}'", target.display())));
        desktop.paste("hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_command_is_unavailable() {
        let desktop = CommandDesktop::default();
        assert!(matches!(
            desktop.read_clipboard().await,
            Err(AdapterError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn adapter_routes_tools() {
        let adapter = DesktopAdapter::new(Arc::new(CommandDesktop::new(
            Some("printf 'from clipboard'".into()),
            Some("cat > /dev/null".into()),
        )));
        let clip = adapter.execute_tool(READ_CLIPBOARD_TOOL, json!({})).await.unwrap();
        assert_eq!(clip, "from clipboard");

        let pasted = adapter
            .execute_tool(PASTE_TOOL, json!({"text": "héllo"}))
            .await
            .unwrap();
        assert_eq!(pasted["length"], 5);

        assert!(adapter.execute_tool(PASTE_TOOL, json!({})).await.is_err());
    }
}
