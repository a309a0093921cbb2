//! External process executor.
//!
//! Every DataStage operation ends in exactly one call to an external
//! client binary (`dsjob`, `dsexport`, `dssearch`).  [`ProcessExecutor`]
//! spawns it, waits for it to exit and always captures both output
//! streams, so a failure carries its full diagnostic text.
//!
//! No timeout and no retry are applied here: a hung command blocks the
//! calling operation until it exits.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::truncate_str;

/// Flags whose following argument is a credential.
const SECRET_FLAGS: &[&str] = &["-password"];

/// Argument prefixes whose remainder is a credential (`dsexport` style).
const SECRET_PREFIXES: &[&str] = &["/P="];

const MASK: &str = "****";

/// Failure of a single external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("executable `{program}` not found in PATH (attempted command: {command})")]
    ExecutableNotFound { program: String, command: String },
    #[error("command exited with status {exit_status}: {command}\nstdout: {stdout}\nstderr: {stderr}")]
    CommandFailed {
        exit_status: i32,
        command: String,
        stdout: String,
        stderr: String,
    },
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("refusing to run an empty command")]
    EmptyCommand,
}

impl ExecError {
    /// Rendered command line (credentials masked), when one was attempted.
    pub fn command(&self) -> Option<&str> {
        match self {
            ExecError::ExecutableNotFound { command, .. }
            | ExecError::CommandFailed { command, .. }
            | ExecError::Spawn { command, .. } => Some(command),
            ExecError::EmptyCommand => None,
        }
    }
}

/// Runs an argument vector and returns its trimmed stdout.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, argv: &[String]) -> Result<String, ExecError>;
}

/// [`Executor`] backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, argv: &[String]) -> Result<String, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        let command = display_command(argv);
        debug!(%program, %command, "spawning external command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecError::ExecutableNotFound {
                        program: program.clone(),
                        command: command.clone(),
                    }
                } else {
                    ExecError::Spawn {
                        command: command.clone(),
                        source: e,
                    }
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            // `code()` is None when the child was killed by a signal.
            let exit_status = output.status.code().unwrap_or(-1);
            warn!(
                %program,
                exit_status,
                stderr = %truncate_str(&stderr, 512),
                "external command failed"
            );
            return Err(ExecError::CommandFailed {
                exit_status,
                command,
                stdout,
                stderr,
            });
        }

        debug!(%program, bytes = stdout.len(), "external command finished");
        Ok(stdout)
    }
}

/// Render `argv` as a single line with credential values masked.
pub fn display_command(argv: &[String]) -> String {
    let mut parts = Vec::with_capacity(argv.len());
    let mut mask_next = false;
    for arg in argv {
        if mask_next {
            parts.push(MASK.to_string());
            mask_next = false;
            continue;
        }
        if SECRET_FLAGS.contains(&arg.as_str()) {
            mask_next = true;
            parts.push(arg.clone());
        } else if let Some(prefix) = SECRET_PREFIXES.iter().find(|p| arg.starts_with(**p)) {
            parts.push(format!("{prefix}{MASK}"));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}
