//! Pipeline backend: feed the text through other plugins in order.
//!
//! Steps resolve among enabled plugins first, then among everything
//! installed.  Each step's result text is the next step's input; streams are
//! drained before the next step starts.

use tracing::{debug, warn};

use opentolk_kernel::Match;
use opentolk_plugins::PipelineConfig;

use crate::error::{EngineError, Result};
use crate::output::{Outcome, RunResult};
use crate::runner::Invocation;

pub(crate) async fn run(invocation: &Invocation<'_>, config: &PipelineConfig) -> Result<Outcome> {
    let pipeline_id = invocation.plugin_id();
    let mut text = invocation.matched.input.clone();

    for (index, step) in config.steps.iter().enumerate() {
        let Some(target) = invocation.runner.registry.resolve_step(&step.plugin) else {
            return Err(EngineError::PipelineTargetNotFound {
                id: step.plugin.clone(),
            });
        };

        debug!(step = index, target = %target.id, "pipeline step");
        let wrap = |source: EngineError| {
            warn!(step = index, target = %step.plugin, error = %source, "pipeline step failed");
            EngineError::PipelineStepFailed {
                pipeline_id: pipeline_id.to_string(),
                step: index,
                source: Box::new(source),
            }
        };

        let outcome = invocation
            .runner
            .execute(Match::direct(target, text), invocation.depth + 1)
            .await
            .map_err(wrap)?;
        text = outcome.into_text().await.map_err(wrap)?;
    }

    Ok(Outcome::Complete(RunResult::plain(text)))
}
