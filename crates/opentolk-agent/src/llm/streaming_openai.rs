//! SSE line parser for OpenAI-compatible streaming chat completions.
//!
//! The stream is a sequence of `data:` lines carrying JSON chunks with
//! `choices[0].delta.content` text fragments, terminated by `data: [DONE]`.
//! Streaming is only used for plain chat, so tool-call deltas are ignored.

use serde_json::Value;

use crate::error::{AgentError, Result};

/// Incremental parser for one streaming response.
#[derive(Debug, Default)]
pub struct OpenAiStreamParser {
    text: String,
    done: bool,
    /// Bytes of an incomplete trailing line.
    pending: Vec<u8>,
}

impl OpenAiStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Everything received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed a raw network chunk, returning the text deltas of every complete
    /// line it finished.
    ///
    /// Lines are split on raw bytes, so a multi-byte character divided
    /// between two chunks is reassembled before decoding.
    pub fn feed_chunk(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);
        let mut deltas = Vec::new();

        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = std::str::from_utf8(&raw).map_err(|e| AgentError::LlmStreamError {
                reason: format!("invalid UTF-8 in stream: {e}"),
            })?;
            if let Some(delta) = self.feed_line(line)? {
                deltas.push(delta);
            }
            if self.done {
                self.pending.clear();
                break;
            }
        }

        Ok(deltas)
    }

    /// Feed a single SSE line.
    ///
    /// Returns `Ok(Some(delta))` for a text fragment and `Ok(None)` for
    /// comments, other SSE fields and non-text chunks.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON in SSE data: {e}"),
        })?;

        if let Some(message) = v["error"]["message"].as_str() {
            return Err(AgentError::LlmStreamError {
                reason: message.to_owned(),
            });
        }

        match v["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => {
                self.text.push_str(content);
                Ok(Some(content.to_owned()))
            }
            _ => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_accumulation() {
        let mut parser = OpenAiStreamParser::new();

        let delta1 = parser
            .feed_line(r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#)
            .unwrap();
        assert_eq!(delta1.as_deref(), Some("Hello"));

        let delta2 = parser
            .feed_line(r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":" world"}}]}"#)
            .unwrap();
        assert_eq!(delta2.as_deref(), Some(" world"));
        assert_eq!(parser.text(), "Hello world");
    }

    #[test]
    fn done_sentinel_sets_flag() {
        let mut parser = OpenAiStreamParser::new();
        assert!(!parser.is_done());
        assert!(parser.feed_line("data: [DONE]").unwrap().is_none());
        assert!(parser.is_done());
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        let mut parser = OpenAiStreamParser::new();
        assert!(parser.feed_line("").unwrap().is_none());
        assert!(parser.feed_line(": keepalive").unwrap().is_none());
        assert!(parser.feed_line("event: message").unwrap().is_none());
    }

    #[test]
    fn role_only_chunk_yields_nothing() {
        let mut parser = OpenAiStreamParser::new();
        let delta = parser
            .feed_line(r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#)
            .unwrap();
        assert!(delta.is_none());
    }

    #[test]
    fn chunks_split_mid_line_are_reassembled() {
        let mut parser = OpenAiStreamParser::new();
        let first = parser
            .feed_chunk(b"data: {\"choices\":[{\"delta\":{\"con")
            .unwrap();
        assert!(first.is_empty());

        let second = parser
            .feed_chunk(b"tent\":\"Hi\"}}]}\n\ndata: [DONE]\n")
            .unwrap();
        assert_eq!(second, vec!["Hi".to_string()]);
        assert!(parser.is_done());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut parser = OpenAiStreamParser::new();
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"é\"}}]}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(parser.feed_chunk(&line[..split]).unwrap().is_empty());
        assert_eq!(parser.feed_chunk(&line[split..]).unwrap(), vec!["é".to_string()]);
    }

    #[test]
    fn error_payload_is_reported() {
        let mut parser = OpenAiStreamParser::new();
        let result = parser.feed_line(r#"data: {"error":{"message":"rate limited"}}"#);
        assert!(matches!(result, Err(AgentError::LlmStreamError { .. })));
    }

    #[test]
    fn invalid_json_returns_error() {
        let mut parser = OpenAiStreamParser::new();
        assert!(parser.feed_line("data: {invalid json}").is_err());
    }
}
