//! Execution results and backend output parsing.
//!
//! Script, HTTP and shortcut backends produce raw text that may carry an
//! output-mode override.  [`parse_output`] tries, in order:
//!
//! 1. a JSON object with a `text` field and optional `output` mode,
//! 2. a first line `@output:<mode>` followed by the body,
//! 3. the text verbatim.

use opentolk_agent::TextStream;
use opentolk_plugins::OutputMode;

use crate::error::Result;

/// Prefix of the output directive line.
pub const OUTPUT_DIRECTIVE: &str = "@output:";

/// Final text plus an optional output-mode override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub text: String,
    /// Set only when the backend asked for a specific mode.
    pub mode: Option<OutputMode>,
}

impl RunResult {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: None,
        }
    }

    /// The override, or `default` when there is none.
    pub fn mode_or(&self, default: OutputMode) -> OutputMode {
        self.mode.unwrap_or(default)
    }
}

/// What an execution produced.
#[derive(Debug)]
pub enum Outcome {
    Complete(RunResult),
    /// Live text deltas; only AI backends configured for streaming.
    Stream(TextStream),
}

impl Outcome {
    /// Resolve to complete text, draining a stream if necessary.
    pub async fn into_text(self) -> Result<String> {
        match self {
            Self::Complete(result) => Ok(result.text),
            Self::Stream(stream) => Ok(stream.collect_text().await?),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

/// Interpret raw backend output.  Surrounding whitespace is trimmed first.
pub fn parse_output(raw: &str) -> RunResult {
    let raw = raw.trim();

    if raw.starts_with('{')
        && let Ok(serde_json::Value::Object(object)) = serde_json::from_str::<serde_json::Value>(raw)
        && let Some(text) = object.get("text")
    {
        let text = match text {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mode = object
            .get("output")
            .and_then(serde_json::Value::as_str)
            .and_then(OutputMode::parse);
        return RunResult { text, mode };
    }

    if let Some(rest) = raw.strip_prefix(OUTPUT_DIRECTIVE)
        && let Some((mode, body)) = rest.split_once('\n')
    {
        return RunResult {
            text: body.to_string(),
            mode: OutputMode::parse(mode),
        };
    }

    RunResult::plain(raw)
}
