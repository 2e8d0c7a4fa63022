//! Shortcut backend: run a named OS automation with the input on stdin.

use tracing::{debug, warn};

use opentolk_adapters::{ProcessSpec, run_process};
use opentolk_plugins::ShortcutConfig;

use crate::error::{EngineError, Result};
use crate::output::{Outcome, parse_output};
use crate::runner::Invocation;

pub(crate) async fn run(invocation: &Invocation<'_>, config: &ShortcutConfig) -> Result<Outcome> {
    let name = config.name.trim();
    if name.is_empty() {
        return Err(EngineError::missing(invocation.plugin_id(), "name"));
    }

    let argv: Vec<String> = invocation
        .runner
        .config
        .shortcut_command
        .iter()
        .map(|arg| arg.replace("{name}", name))
        .collect();
    let Some((program, args)) = argv.split_first() else {
        return Err(EngineError::missing(invocation.plugin_id(), "shortcut_command"));
    };

    let spec = ProcessSpec::new(program)
        .args(args)
        .with_cwd(&invocation.manifest().dir)
        .with_envs(invocation.subprocess_env().await?)
        .with_stdin(invocation.matched.input.clone())
        .with_timeout(config.timeout());

    debug!(shortcut = name, "running shortcut");
    let output = run_process(&spec)
        .await
        .map_err(|e| EngineError::from_adapter(e, format!("shortcut `{name}`")))?;

    if !output.success() {
        warn!(shortcut = name, exit_code = output.exit_code, "shortcut failed");
        return Err(EngineError::ProcessFailed {
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(Outcome::Complete(parse_output(&output.stdout)))
}
