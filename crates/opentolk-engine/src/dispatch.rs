//! Output dispatch: hand a finished result to the collaborator for its mode.
//!
//! Each [`OutputMode`] maps to one [`DeliverySink`].  A failed primary
//! delivery is retried once through the policy's fallback mode; side-effect
//! modes then receive the same text, and their failures are only logged.
//! Streams skip mode dispatch and are rendered live in the
//! [`ConversationView`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use opentolk_agent::{AgentError, StreamEvent, TextStream};
use opentolk_plugins::{Manifest, OutputMode, OutputPolicy, TextFormat};

use crate::error::{EngineError, Result};
use crate::output::{Outcome, RunResult};

/// Delivers text through one output mode (paste, clipboard, notify, ...).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, text: &str, format: TextFormat) -> Result<()>;
}

/// A live conversation surface.
#[async_trait]
pub trait ConversationView: Send + Sync {
    /// Open (or continue) the conversation for `plugin_id`.
    async fn begin(&self, plugin_id: &str);
    async fn delta(&self, text: &str);
    /// The response is complete; `text` is all of it.
    async fn finish(&self, text: &str);
    async fn fail(&self, reason: &str);
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub text: String,
    /// The mode that delivered; [`OutputMode::Reply`] for streams.
    pub mode: OutputMode,
    pub streamed: bool,
    pub used_fallback: bool,
}

/// Routes results to delivery collaborators.
pub struct OutputDispatcher {
    view: Arc<dyn ConversationView>,
    sinks: HashMap<OutputMode, Arc<dyn DeliverySink>>,
}

impl OutputDispatcher {
    #[must_use]
    pub fn new(view: Arc<dyn ConversationView>) -> Self {
        Self {
            view,
            sinks: HashMap::new(),
        }
    }

    /// Register the sink for `mode`, replacing any previous one.
    #[must_use]
    pub fn with_sink(mut self, mode: OutputMode, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.insert(mode, sink);
        self
    }

    pub fn has_sink(&self, mode: OutputMode) -> bool {
        self.sinks.contains_key(&mode)
    }

    /// Deliver an execution outcome according to the manifest's policy.
    pub async fn deliver(&self, manifest: &Manifest, outcome: Outcome) -> Result<Delivery> {
        match outcome {
            Outcome::Stream(stream) => self.render_stream(&manifest.id, stream).await,
            Outcome::Complete(result) => self.deliver_result(manifest, &result).await,
        }
    }

    async fn deliver_result(&self, manifest: &Manifest, result: &RunResult) -> Result<Delivery> {
        let policy: OutputPolicy = manifest.output_policy();
        let primary = result.mode_or(policy.mode);
        let format = policy.format;

        let delivered = self
            .deliver_mode(&manifest.id, primary, &result.text, format)
            .await;
        let (mode, used_fallback) = match delivered {
            Ok(()) => (primary, false),
            Err(primary_err) => {
                let Some(fallback) = policy.fallback.filter(|f| *f != primary) else {
                    return Err(delivery_failed(primary, primary_err));
                };
                warn!(
                    plugin_id = %manifest.id,
                    mode = %primary,
                    fallback = %fallback,
                    error = %primary_err,
                    "primary delivery failed, trying fallback"
                );
                self.deliver_mode(&manifest.id, fallback, &result.text, format)
                    .await
                    .map_err(|e| EngineError::DeliveryFailed {
                        mode: fallback,
                        reason: format!("{e} (after `{primary}` failed: {primary_err})"),
                    })?;
                (fallback, true)
            }
        };
        info!(plugin_id = %manifest.id, mode = %mode, used_fallback, "result delivered");

        for side_effect in policy.side_effects.iter().copied() {
            if side_effect == mode {
                debug!(plugin_id = %manifest.id, mode = %mode, "side effect already delivered, skipping");
                continue;
            }
            if let Err(e) = self
                .deliver_mode(&manifest.id, side_effect, &result.text, format)
                .await
            {
                warn!(
                    plugin_id = %manifest.id,
                    mode = %side_effect,
                    error = %e,
                    "side-effect delivery failed"
                );
            }
        }

        Ok(Delivery {
            text: result.text.clone(),
            mode,
            streamed: false,
            used_fallback,
        })
    }

    async fn deliver_mode(
        &self,
        plugin_id: &str,
        mode: OutputMode,
        text: &str,
        format: TextFormat,
    ) -> Result<()> {
        debug!(mode = %mode, len = text.len(), "delivering");
        if let Some(sink) = self.sinks.get(&mode) {
            return sink.deliver(text, format).await;
        }
        match mode {
            OutputMode::Silent => Ok(()),
            OutputMode::Reply => {
                self.view.begin(plugin_id).await;
                self.view.finish(text).await;
                Ok(())
            }
            other => Err(EngineError::DeliveryFailed {
                mode: other,
                reason: "no delivery sink registered".into(),
            }),
        }
    }

    async fn render_stream(&self, plugin_id: &str, mut stream: TextStream) -> Result<Delivery> {
        self.view.begin(plugin_id).await;
        let mut full = String::new();

        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Delta(delta) => {
                    self.view.delta(&delta).await;
                    full.push_str(&delta);
                }
                StreamEvent::Done => {
                    self.view.finish(&full).await;
                    info!(plugin_id, len = full.len(), "stream delivered");
                    return Ok(Delivery {
                        text: full,
                        mode: OutputMode::Reply,
                        streamed: true,
                        used_fallback: false,
                    });
                }
                StreamEvent::Failed(reason) => {
                    self.view.fail(&reason).await;
                    return Err(AgentError::LlmStreamError { reason }.into());
                }
            }
        }

        let reason = "stream ended without completing".to_string();
        self.view.fail(&reason).await;
        Err(AgentError::LlmStreamError { reason }.into())
    }
}

impl std::fmt::Debug for OutputDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDispatcher")
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn delivery_failed(mode: OutputMode, err: EngineError) -> EngineError {
    match err {
        failed @ EngineError::DeliveryFailed { .. } => failed,
        other => EngineError::DeliveryFailed {
            mode,
            reason: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
