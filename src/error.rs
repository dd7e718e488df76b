//! Error types for OroDC

use thiserror::Error;

/// Result type for OroDC operations
pub type Result<T> = std::result::Result<T, OrodcError>;

/// OroDC error types
#[derive(Error, Debug)]
pub enum OrodcError {
    #[error("{0}")]
    Usage(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Invalid environment '{name}': {reason}")]
    InvalidEnvironment { name: String, reason: String },

    #[error("No free port in range {min}-{max}")]
    NoFreePort { min: u16, max: u16 },

    #[error("Cannot {action} sync session {id}: session is {state}")]
    InvalidSyncState {
        id: String,
        state: String,
        action: String,
    },

    #[error("Sync failure: {reason}")]
    SyncFailure { reason: String },

    #[error("{}", external_tool_message(.command, .exit_code, .stderr_tail))]
    ExternalTool {
        command: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("{command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn external_tool_message(command: &str, exit_code: &i32, stderr_tail: &str) -> String {
    if stderr_tail.is_empty() {
        format!("{command} exited with code {exit_code}")
    } else {
        format!("{command} exited with code {exit_code}: {stderr_tail}")
    }
}

impl OrodcError {
    /// Exit code the dispatcher reports for this error kind.
    ///
    /// 1 = usage or configuration problem, 2 = external tool trouble,
    /// 3 = internal/unexpected.
    pub fn exit_code(&self) -> i32 {
        match self {
            OrodcError::Usage(_)
            | OrodcError::UnknownEnvironment(_)
            | OrodcError::InvalidEnvironment { .. }
            | OrodcError::NoFreePort { .. }
            | OrodcError::InvalidSyncState { .. }
            | OrodcError::Yaml(_) => 1,
            OrodcError::ExternalTool { .. }
            | OrodcError::Timeout { .. }
            | OrodcError::SyncFailure { .. } => 2,
            OrodcError::Interrupted
            | OrodcError::Io(_)
            | OrodcError::Json(_)
            | OrodcError::Internal(_) => 3,
        }
    }
}
