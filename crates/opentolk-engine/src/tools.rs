//! The tool box: a manifest's declared tools exposed to the tool loop.
//!
//! Built-in tools delegate to the Runner's adapters, except `run_plugin`,
//! which re-enters the Runner one level deeper.  Process tools receive their
//! arguments as JSON on stdin and in `OPENTOLK_TOOL_ARGS`; a non-zero exit is
//! reported to the model as text, never raised.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use opentolk_adapters::{Adapter, ProcessSpec, interpreter_for, run_process};
use opentolk_agent::{AgentError, ToolAdapter, ToolDefinition};
use opentolk_kernel::Match;
use opentolk_plugins::{BuiltinTool, DEFAULT_TIMEOUT_SECS, Manifest, ToolSpec};

use crate::error::{EngineError, Result};
use crate::runner::{Invocation, Runner};

pub const ENV_TOOL_NAME: &str = "OPENTOLK_TOOL_NAME";
pub const ENV_TOOL_ARGS: &str = "OPENTOLK_TOOL_ARGS";

/// Tool box for one AI invocation.
pub(crate) struct Toolbox {
    runner: Runner,
    manifest: Arc<Manifest>,
    /// Subprocess environment of the calling invocation.
    env: BTreeMap<String, String>,
    depth: usize,
    specs: Vec<ToolSpec>,
    definitions: Vec<ToolDefinition>,
}

impl Toolbox {
    /// Resolve every declared tool to a definition.  Fails when a built-in
    /// adapter does not offer the tool.
    pub async fn new(invocation: &Invocation<'_>, specs: &[ToolSpec]) -> Result<Self> {
        let runner = invocation.runner.clone();
        let definitions = specs
            .iter()
            .map(|spec| definition(&runner, spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            env: invocation.subprocess_env().await?,
            manifest: Arc::clone(invocation.manifest()),
            depth: invocation.depth,
            specs: specs.to_vec(),
            definitions,
            runner,
        })
    }

    async fn run_plugin(&self, arguments: &Value) -> std::result::Result<String, String> {
        let plugin_id = arguments
            .get("plugin")
            .and_then(Value::as_str)
            .ok_or("missing required string field `plugin`")?;
        let input = arguments.get("input").and_then(Value::as_str).unwrap_or_default();

        let target = self
            .runner
            .registry
            .resolve_step(plugin_id)
            .ok_or_else(|| format!("plugin not found: `{plugin_id}`"))?;
        let outcome = self
            .runner
            .execute(Match::direct(target, input), self.depth + 1)
            .await
            .map_err(|e| e.to_string())?;
        outcome.into_text().await.map_err(|e| e.to_string())
    }

    async fn run_process_tool(
        &self,
        name: &str,
        command: &str,
        interpreter: Option<&str>,
        timeout: Option<u64>,
        arguments: &Value,
    ) -> std::result::Result<String, String> {
        let path = self.manifest.dir.join(command);
        let interpreter = interpreter.or_else(|| interpreter_for(&path));
        let path = path.display().to_string();
        let args_json = arguments.to_string();

        let spec = match interpreter {
            Some(interpreter) => ProcessSpec::new(interpreter).arg(&path),
            None => ProcessSpec::new(&path),
        }
        .with_cwd(&self.manifest.dir)
        .with_envs(self.env.clone())
        .with_env(ENV_TOOL_NAME, name)
        .with_env(ENV_TOOL_ARGS, args_json.clone())
        .with_stdin(args_json)
        .with_timeout(Duration::from_secs(timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)));

        let output = run_process(&spec).await.map_err(|e| e.to_string())?;
        if output.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            Ok(format!("Tool exited with code {}: {detail}", output.exit_code))
        }
    }
}

#[async_trait]
impl ToolAdapter for Toolbox {
    fn adapter_id(&self) -> &str {
        &self.manifest.id
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn execute(&self, tool_name: &str, arguments: Value) -> opentolk_agent::Result<String> {
        let Some(spec) = self.specs.iter().find(|s| s.name() == tool_name) else {
            return Err(AgentError::UnknownTool {
                tool_name: tool_name.to_string(),
            });
        };
        debug!(tool = tool_name, "tool call");

        let outcome = match spec {
            ToolSpec::Builtin { name } => {
                if let Some(capability) = name.required_capability()
                    && !self.manifest.declares(capability)
                {
                    Err(format!(
                        "plugin `{}` does not declare the `{capability}` permission",
                        self.manifest.id
                    ))
                } else if let Some(adapter) = adapter_for(&self.runner, *name) {
                    adapter
                        .execute_tool(tool_name, arguments)
                        .await
                        .map(value_text)
                        .map_err(|e| e.to_string())
                } else {
                    self.run_plugin(&arguments).await
                }
            }
            ToolSpec::Process {
                command,
                interpreter,
                timeout,
                ..
            } => {
                self.run_process_tool(tool_name, command, interpreter.as_deref(), *timeout, &arguments)
                    .await
            }
        };

        outcome.map_err(|reason| AgentError::ToolExecutionFailed {
            tool_name: tool_name.to_string(),
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// The adapter serving a built-in tool; `None` for `run_plugin`.
fn adapter_for(runner: &Runner, tool: BuiltinTool) -> Option<&Arc<dyn Adapter>> {
    match tool {
        BuiltinTool::WebSearch => Some(&runner.web_search),
        BuiltinTool::ReadClipboard | BuiltinTool::Paste => Some(&runner.desktop),
        BuiltinTool::MailList
        | BuiltinTool::MailRead
        | BuiltinTool::MailSearch
        | BuiltinTool::MailSend => Some(&runner.mail),
        BuiltinTool::RunPlugin => None,
    }
}

fn definition(runner: &Runner, spec: &ToolSpec) -> Result<ToolDefinition> {
    match spec {
        ToolSpec::Builtin { name } => {
            let Some(adapter) = adapter_for(runner, *name) else {
                return Ok(run_plugin_definition());
            };
            let tool = adapter
                .tool(name.as_str())
                .ok_or_else(|| EngineError::UnknownTool {
                    name: name.as_str().to_string(),
                })?;
            Ok(ToolDefinition {
                name: tool.name,
                description: tool.description,
                input_schema: tool.parameters,
            })
        }
        ToolSpec::Process {
            name,
            description,
            parameters,
            ..
        } => Ok(ToolDefinition {
            name: name.clone(),
            description: description.clone(),
            input_schema: parameters
                .clone()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }),
    }
}

fn run_plugin_definition() -> ToolDefinition {
    ToolDefinition {
        name: BuiltinTool::RunPlugin.as_str().into(),
        description: "Run another installed plugin on some text and return its result.".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "plugin": { "type": "string", "description": "Id of the plugin to run" },
                "input": { "type": "string", "description": "Text handed to the plugin" }
            },
            "required": ["plugin", "input"]
        }),
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}
