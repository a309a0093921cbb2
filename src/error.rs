//! Operation errors and the structured error body reported to callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exec::ExecError;

/// Failure of a single operation call.
#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("missing required argument `{0}`")]
    MissingArgument(String),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("datastage setting `{0}` is not configured")]
    NotConfigured(&'static str),
}

impl OpError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        OpError::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            OpError::Exec(ExecError::CommandFailed { .. }) => "ExternalCommandError",
            OpError::Exec(ExecError::ExecutableNotFound { .. }) => "ExecutableNotFound",
            OpError::Exec(ExecError::Spawn { .. }) => "SpawnFailed",
            OpError::Exec(ExecError::EmptyCommand) => "EmptyCommand",
            OpError::MissingArgument(_) => "MissingArgument",
            OpError::InvalidArgument { .. } => "InvalidArgument",
            OpError::NotConfigured(_) => "NotConfigured",
        }
    }
}

/// Caller-visible failure: enough context to diagnose a failed call
/// without access to the gateway's logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorBody {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            operation: None,
            command: None,
            exit_status: None,
            stdout: None,
            stderr: None,
        }
    }
}

impl From<&OpError> for ErrorBody {
    fn from(err: &OpError) -> Self {
        let mut body = ErrorBody::new(err.kind(), err.to_string());
        if let OpError::Exec(exec) = err {
            body.command = exec.command().map(String::from);
            if let ExecError::CommandFailed {
                exit_status,
                stdout,
                stderr,
                ..
            } = exec
            {
                body.message = format!("command exited with status {exit_status}");
                body.exit_status = Some(*exit_status);
                body.stdout = Some(stdout.clone());
                body.stderr = Some(stderr.clone());
            }
        }
        body
    }
}
