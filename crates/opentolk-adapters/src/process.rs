//! Subprocess runner -- spawn a program with arguments, environment, optional
//! standard input and a hard timeout.
//!
//! The child is spawned with `kill_on_drop(true)`; when the timeout elapses
//! the wait future is dropped and the process is killed.  Stdout and stderr
//! are each truncated to [`MAX_OUTPUT_BYTES`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{AdapterError, Result};

/// Default subprocess timeout.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum output size in bytes (100 KB), applied to stdout and stderr
/// independently.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Everything needed to run one subprocess.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Written to the child's standard input, which is then closed.
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }

    /// Run `command` through `sh -c`.
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(command)
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory for the child.  An empty path leaves the parent's
    /// working directory in place.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        self.cwd = (!cwd.as_os_str().is_empty()).then_some(cwd);
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What a finished subprocess produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn the process, feed stdin, and wait for it within the timeout.
///
/// A non-zero exit is not an error here; callers decide what it means.
pub async fn run_process(spec: &ProcessSpec) -> Result<ProcessOutput> {
    debug!(
        program = %spec.program,
        args = ?spec.args,
        cwd = ?spec.cwd,
        timeout_secs = spec.timeout.as_secs(),
        "spawning process"
    );

    let mut command = tokio::process::Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|e| AdapterError::ExecutionFailed {
        tool_name: spec.program.clone(),
        reason: format!("failed to spawn process: {e}"),
    })?;

    // Written from a separate task so a child that never reads stdin cannot
    // block us before the timeout starts.
    if let (Some(input), Some(mut pipe)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                debug!(error = %e, "child closed stdin early");
            }
            drop(pipe);
        });
    }

    let started = Instant::now();
    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let (stdout, stdout_truncated) = truncate_output(&output.stdout);
            let (stderr, stderr_truncated) = truncate_output(&output.stderr);
            debug!(
                program = %spec.program,
                exit_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "process completed"
            );
            Ok(ProcessOutput {
                exit_code,
                stdout,
                stderr,
                truncated: stdout_truncated || stderr_truncated,
            })
        }
        Ok(Err(e)) => Err(AdapterError::ExecutionFailed {
            tool_name: spec.program.clone(),
            reason: format!("process error: {e}"),
        }),
        Err(_) => {
            warn!(
                program = %spec.program,
                timeout_secs = spec.timeout.as_secs(),
                "process timed out"
            );
            Err(AdapterError::Timeout {
                seconds: spec.timeout.as_secs(),
                reason: format!("`{}` exceeded its time limit", spec.program),
            })
        }
    }
}

/// Pick an interpreter from a script's file extension.
pub fn interpreter_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "sh" | "bash" => Some("bash"),
        "py" => Some("python3"),
        "js" | "mjs" => Some("node"),
        "rb" => Some("ruby"),
        _ => None,
    }
}

/// Truncate raw output to [`MAX_OUTPUT_BYTES`], converting to a lossy UTF-8
/// string.  Returns `(output, was_truncated)`.
pub fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
