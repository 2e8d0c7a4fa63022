//! Terminal delivery: shell-command sinks, stdout sinks and a streaming view.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use opentolk_adapters::{ProcessSpec, run_process};
use opentolk_engine::{ConversationView, DeliverySink, EngineError, OutputDispatcher, Result};
use opentolk_plugins::{OutputMode, TextFormat};

/// Pipes the text to a shell command (`wl-copy`, `notify-send`, `say`, ...).
#[derive(Debug)]
pub struct CommandSink {
    mode: OutputMode,
    command: String,
}

impl CommandSink {
    pub fn new(mode: OutputMode, command: impl Into<String>) -> Self {
        Self {
            mode,
            command: command.into(),
        }
    }
}

#[async_trait]
impl DeliverySink for CommandSink {
    async fn deliver(&self, text: &str, _format: TextFormat) -> Result<()> {
        let spec = ProcessSpec::shell(&self.command).with_stdin(text);
        let output = run_process(&spec).await.map_err(|e| EngineError::DeliveryFailed {
            mode: self.mode,
            reason: e.to_string(),
        })?;
        if !output.success() {
            return Err(EngineError::DeliveryFailed {
                mode: self.mode,
                reason: format!("`{}` exited with code {}: {}", self.command, output.exit_code, output.stderr.trim()),
            });
        }
        debug!(mode = %self.mode, command = %self.command, "delivered");
        Ok(())
    }
}

/// Writes the text to stdout.
#[derive(Debug, Default)]
pub struct PrintSink;

#[async_trait]
impl DeliverySink for PrintSink {
    async fn deliver(&self, text: &str, _format: TextFormat) -> Result<()> {
        println!("{text}");
        Ok(())
    }
}

/// Conversation view on the terminal: deltas are printed as they arrive.
#[derive(Debug, Default)]
pub struct TerminalView;

#[async_trait]
impl ConversationView for TerminalView {
    async fn begin(&self, plugin_id: &str) {
        debug!(plugin_id, "conversation started");
    }

    async fn delta(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    async fn finish(&self, _text: &str) {
        println!();
    }

    async fn fail(&self, reason: &str) {
        eprintln!("\nerror: {reason}");
    }
}

/// Build the dispatcher from `[sinks]`.
///
/// Modes with a configured command pipe to it; the remaining visible modes
/// print to stdout.  `silent` and `reply` are handled by the dispatcher.
pub fn build_dispatcher(commands: &HashMap<String, String>) -> OutputDispatcher {
    let mut dispatcher = OutputDispatcher::new(Arc::new(TerminalView));

    for (name, command) in commands {
        match OutputMode::parse(name) {
            Some(mode @ (OutputMode::Silent | OutputMode::Reply)) => {
                warn!(mode = %mode, "sink ignored, mode is built in");
            }
            Some(mode) => {
                dispatcher = dispatcher.with_sink(mode, Arc::new(CommandSink::new(mode, command)));
            }
            None => warn!(mode = %name, "unknown output mode in [sinks]"),
        }
    }

    for mode in OutputMode::ALL {
        if matches!(mode, OutputMode::Silent | OutputMode::Reply) || dispatcher.has_sink(mode) {
            continue;
        }
        dispatcher = dispatcher.with_sink(mode, Arc::new(PrintSink));
    }
    dispatcher
}
