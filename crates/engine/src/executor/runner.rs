use std::{io, path::Path, process::Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a shell command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The text shown to the operator: stdout, or stderr when stdout is empty.
    pub fn display_text(&self) -> &str {
        if self.stdout.is_empty() { &self.stderr } else { &self.stdout }
    }
}

/// A shell command that could not be spawned or exited unsuccessfully.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with {}", describe_exit(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    /// Combined stderr and stdout, used as the operator-facing output of a failed command.
    pub fn combined_output(&self) -> String {
        match self {
            CommandError::Spawn { .. } => self.to_string(),
            CommandError::Failed { stdout, stderr, .. } => format!("{stderr}{stdout}"),
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs shell commands on behalf of the engine.
///
/// Implementations decide how a command line is interpreted; the engine only relies on the
/// captured output and on failures being reported as [`CommandError`].
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn run(&self, command: &str, cwd: Option<&Path>) -> Result<CommandOutput, CommandError>;
}

/// Executes commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: String,
}

impl SystemShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl ShellExecutor for SystemShell {
    async fn run(&self, command: &str, cwd: Option<&Path>) -> Result<CommandOutput, CommandError> {
        let mut process = Command::new(&self.program);
        process
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            process.current_dir(cwd);
        }

        let output = process.output().await.map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(%command, status = ?output.status.code(), "shell command finished");

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
