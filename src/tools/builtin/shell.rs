//! Shell command execution tool.
//!
//! Runs `bash -c <command>` in the job's working directory with:
//! - a hard wall-clock timeout (the child is killed on expiry)
//! - independent stdout/stderr capture, each truncated above a byte cap
//! - an optional allow-list of command prefixes
//!
//! A non-zero exit code is reported inline and is not an error by itself;
//! only timeouts, spawn failures and disallowed commands are.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolParams};

/// Per-stream byte cap before truncation.
pub const MAX_OUTPUT_SIZE: usize = 100_000;

pub const TRUNCATION_MARKER: &str = "\n...[output truncated]...";

/// Exit code reported when the command is killed for running too long.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
pub struct BashParams {
    pub command: String,
}

impl ToolParams for BashParams {
    const REQUIRED: &'static [&'static str] = &["command"];
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub truncated: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Text handed back to the model.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if !self.stdout.is_empty() {
            parts.push(self.stdout.clone());
        }
        if !self.stderr.is_empty() {
            parts.push(format!("[stderr]\n{}", self.stderr));
        }
        parts.push(format!("[exit code: {}]", self.exit_code));
        parts.join("\n")
    }
}

/// Shell command execution tool.
#[derive(Debug)]
pub struct ShellTool {
    working_dir: PathBuf,
    timeout: Duration,
    allowed_commands: Option<Vec<String>>,
}

impl ShellTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            timeout: DEFAULT_TIMEOUT,
            allowed_commands: None,
        }
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Restrict execution to commands starting with one of `prefixes`.
    pub fn with_allowed_commands(mut self, prefixes: Option<Vec<String>>) -> Self {
        self.allowed_commands = prefixes;
        self
    }

    fn is_allowed(&self, cmd: &str) -> bool {
        let Some(allowed) = &self.allowed_commands else {
            return true;
        };

        let cmd = cmd.trim();
        if cmd.is_empty() {
            return false;
        }

        allowed
            .iter()
            .any(|prefix| cmd == prefix || cmd.starts_with(&format!("{} ", prefix)))
    }

    /// Run a command and capture its output.
    pub async fn run(&self, cmd: &str) -> Result<CommandOutput, ToolError> {
        if !self.is_allowed(cmd) {
            let base = cmd.split_whitespace().next().unwrap_or_default();
            return Err(ToolError::NotAuthorized(format!(
                "Command not allowed: {}",
                base
            )));
        }

        tracing::info!(command = %truncate_for_log(cmd), "Executing command");

        let mut command = Command::new("bash");
        command
            .args(["-c", cmd])
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if std::env::var_os("HOME").is_none() {
            command.env("HOME", "/tmp");
        }

        let child = command
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("Execution error: {}", e)))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let (stdout, stdout_truncated) = truncate_output(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output(&output.stderr);
                Ok(CommandOutput {
                    stdout,
                    stderr,
                    exit_code: output.status.code().unwrap_or(-1),
                    truncated: stdout_truncated || stderr_truncated,
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(format!("Execution error: {}", e))),
            Err(_) => {
                tracing::warn!(
                    "Command timed out after {}s: {}",
                    self.timeout.as_secs(),
                    truncate_for_log(cmd)
                );
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {} seconds", self.timeout.as_secs()),
                    exit_code: TIMEOUT_EXIT_CODE,
                    truncated: false,
                    timed_out: true,
                })
            }
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    type Params = BashParams;

    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Execute a bash command in the working directory. \
         Use for: running git commands, make, go build, find, etc. \
         Commands run with server permissions. Output is captured."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute."
                }
            },
            "required": BashParams::REQUIRED
        })
    }

    async fn execute(&self, params: BashParams) -> Result<ToolOutput, ToolError> {
        let output = self.run(&params.command).await?;
        let rendered = output.render();
        if output.timed_out {
            Ok(ToolOutput::failure(rendered))
        } else {
            Ok(ToolOutput::text(rendered))
        }
    }
}

/// Cut `bytes` to [`MAX_OUTPUT_SIZE`] and append the marker when needed.
fn truncate_output(bytes: &[u8]) -> (String, bool) {
    if bytes.len() <= MAX_OUTPUT_SIZE {
        (String::from_utf8_lossy(bytes).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&bytes[..MAX_OUTPUT_SIZE]).into_owned();
        s.push_str(TRUNCATION_MARKER);
        (s, true)
    }
}

/// Char-aware so multi-byte commands never split mid-character.
fn truncate_for_log(s: &str) -> String {
    if s.chars().count() <= 100 {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(100).collect::<String>())
    }
}
