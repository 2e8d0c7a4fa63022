//! Script backend: run a local executable with the invocation environment.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use opentolk_adapters::{ProcessSpec, interpreter_for, run_process};
use opentolk_plugins::ScriptConfig;

use crate::error::{EngineError, Result};
use crate::output::{Outcome, parse_output};
use crate::runner::Invocation;

/// Interpreter for inline bodies that carry neither an explicit interpreter
/// nor a shebang line.
const INLINE_DEFAULT_INTERPRETER: &str = "sh";

/// Where the script lives for this run.  An inline body is written to a
/// temporary file that is removed when this value drops.
enum ScriptPath {
    File(PathBuf),
    Inline(TempPath),
}

impl ScriptPath {
    fn path(&self) -> &Path {
        match self {
            Self::File(path) => path,
            Self::Inline(temp) => temp,
        }
    }
}

pub(crate) async fn run(invocation: &Invocation<'_>, config: &ScriptConfig) -> Result<Outcome> {
    let manifest = invocation.manifest();
    let script = resolve_script(invocation, config).await?;

    let interpreter = match (&config.interpreter, &script, &config.inline) {
        (Some(explicit), _, _) => Some(explicit.clone()),
        (None, ScriptPath::File(path), _) => interpreter_for(path).map(String::from),
        (None, ScriptPath::Inline(_), Some(body)) if body.starts_with("#!") => None,
        (None, ScriptPath::Inline(_), _) => Some(INLINE_DEFAULT_INTERPRETER.to_string()),
    };

    let script_path = script.path().display().to_string();
    let spec = match &interpreter {
        Some(interpreter) => ProcessSpec::new(interpreter).arg(&script_path),
        None => ProcessSpec::new(&script_path),
    }
    .with_cwd(&manifest.dir)
    .with_envs(invocation.subprocess_env().await?)
    .with_timeout(config.timeout());

    debug!(script = %script_path, interpreter = ?interpreter, "running script");
    let output = run_process(&spec)
        .await
        .map_err(|e| EngineError::from_adapter(e, format!("script `{}`", manifest.id)))?;

    if !output.success() {
        warn!(exit_code = output.exit_code, "script failed");
        return Err(EngineError::ProcessFailed {
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(Outcome::Complete(parse_output(&output.stdout)))
}

async fn resolve_script(invocation: &Invocation<'_>, config: &ScriptConfig) -> Result<ScriptPath> {
    if let Some(command) = config.command.as_deref().filter(|c| !c.trim().is_empty()) {
        return Ok(ScriptPath::File(invocation.manifest().dir.join(command)));
    }

    let Some(body) = config.inline.as_deref() else {
        return Err(EngineError::missing(invocation.plugin_id(), "command"));
    };

    let temp = tempfile::Builder::new()
        .prefix("opentolk-inline-")
        .tempfile()?
        .into_temp_path();
    tokio::fs::write(&temp, body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o755)).await?;
    }

    Ok(ScriptPath::Inline(temp))
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use opentolk_kernel::Match;
    use opentolk_plugins::{PluginRegistry, parse_manifest};

    use crate::runner::{Runner, RunnerConfig};

    use super::*;

    fn runner(data_root: &Path) -> Runner {
        Runner::new(
            Arc::new(PluginRegistry::new()),
            RunnerConfig {
                data_root: data_root.to_path_buf(),
                ..RunnerConfig::default()
            },
        )
    }

    fn inline(id: &str, body: &str) -> Arc<opentolk_plugins::Manifest> {
        let json = serde_json::json!({
            "id": id,
            "name": id,
            "trigger": {"type": "catch_all"},
            "execution": {"type": "script", "inline": body}
        });
        Arc::new(parse_manifest(&json.to_string()).unwrap())
    }

    #[tokio::test]
    async fn inline_body_defaults_to_sh() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = inline("com.x.echo", "printf '%s' \"$OPENTOLK_INPUT\" | tr a-z A-Z");
        let outcome = runner(dir.path())
            .run(Match::direct(manifest, "shout"))
            .await
            .unwrap();
        assert_eq!(outcome.into_text().await.unwrap(), "SHOUT");
    }

    #[tokio::test]
    async fn manifest_without_directory_runs() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = inline("com.x.nodir", "echo ran");
        assert!(manifest.dir.as_os_str().is_empty());
        let outcome = runner(dir.path())
            .run(Match::direct(manifest, ""))
            .await
            .unwrap();
        assert_eq!(outcome.into_text().await.unwrap(), "ran");
    }

    #[tokio::test]
    async fn inline_shebang_is_executed_directly() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = inline("com.x.bang", "#!/bin/sh\necho \"$0\" | grep -q opentolk-inline && echo direct");
        let outcome = runner(dir.path())
            .run(Match::direct(manifest, ""))
            .await
            .unwrap();
        assert_eq!(outcome.into_text().await.unwrap(), "direct");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = inline("com.x.fail", "echo 'bad input' >&2; exit 4");
        let err = runner(dir.path())
            .run(Match::direct(manifest, "x"))
            .await
            .unwrap_err();
        match err {
            EngineError::ProcessFailed { exit_code, stderr } => {
                assert_eq!(exit_code, 4);
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn directive_in_stdout_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = inline("com.x.dir", "printf '@output:notify\\ndone'");
        let outcome = runner(dir.path())
            .run(Match::direct(manifest, ""))
            .await
            .unwrap();
        match outcome {
            Outcome::Complete(result) => {
                assert_eq!(result.text, "done");
                assert_eq!(result.mode, Some(opentolk_plugins::OutputMode::Notify));
            }
            Outcome::Stream(_) => panic!("script produced a stream"),
        }
    }
}
