//! Sync session model

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Sync session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No session exists (or it was terminated)
    Stopped,
    /// Session created, endpoints still connecting
    Starting,
    /// Session is mirroring changes
    Running,
    /// Session is paused
    Paused,
    /// The underlying engine reported an error
    Failed,
}

impl SyncState {
    /// States from which an explicit stop is valid.
    pub fn stoppable(self) -> bool {
        matches!(self, SyncState::Running | SyncState::Paused | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Stopped => "stopped",
            SyncState::Starting => "starting",
            SyncState::Running => "running",
            SyncState::Paused => "paused",
            SyncState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A managed file-mirroring relationship between a host directory and a
/// container directory
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// Session identifier, also the engine-side session name
    pub id: String,
    /// Host directory
    pub host_path: PathBuf,
    /// Container directory
    pub container_path: String,
    /// Current state
    pub state: SyncState,
    /// Most recent engine error, if any
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SyncSession {
    pub fn new(host_path: PathBuf, container_path: String) -> Self {
        let id = format!(
            "sync-{}",
            uuid::Uuid::new_v4().to_string()[..8].to_string()
        );
        Self {
            id,
            host_path,
            container_path,
            state: SyncState::Stopped,
            last_error: None,
            created_at: Utc::now(),
        }
    }
}
