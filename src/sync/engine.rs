//! Sync engine boundary
//!
//! The engine runs as a background daemon with its own lifetime; the
//! adapter holds only session identifiers and queries the daemon by name.
//! [`MutagenEngine`] drives the mutagen binary; tests substitute a mock.

use super::session::SyncState;
use crate::error::Result;
use crate::process::CommandRunner;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A session as reported by the engine daemon
#[derive(Debug, Clone)]
pub struct EngineSession {
    /// Session name (our identifier)
    pub id: String,
    /// Host-side directory
    pub host_path: PathBuf,
    /// Container-side directory
    pub container_path: String,
    /// Mapped state
    pub state: SyncState,
    /// Engine-reported error detail
    pub last_error: Option<String>,
}

/// Control surface over the external sync daemon
#[allow(async_fn_in_trait)]
pub trait SyncEngine {
    /// Create a session named `id` mirroring `host_path` into
    /// `container_path`.
    async fn create(&self, id: &str, host_path: &Path, container_path: &str) -> Result<()>;
    /// Pause a session by name.
    async fn pause(&self, id: &str) -> Result<()>;
    /// Resume a paused session by name.
    async fn resume(&self, id: &str) -> Result<()>;
    /// Terminate a session by name.
    async fn terminate(&self, id: &str) -> Result<()>;
    /// List sessions belonging to this project.
    async fn list(&self) -> Result<Vec<EngineSession>>;
}

/// Adapter over the mutagen binary
pub struct MutagenEngine {
    runner: CommandRunner,
    binary: String,
    project: String,
    /// Container receiving the beta endpoint, e.g. `myshop-cli-1`
    container: String,
    /// Extra environment for engine invocations (DOCKER_HOST for remote)
    env: BTreeMap<String, String>,
}

impl MutagenEngine {
    pub fn new(
        runner: CommandRunner,
        binary: String,
        project: String,
        container: String,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            runner,
            binary,
            project,
            container,
            env,
        }
    }

    fn label(&self) -> String {
        format!("orodc-project={}", self.project)
    }

    fn beta_url(&self, container_path: &str) -> String {
        let path = if container_path.starts_with('/') {
            container_path.to_string()
        } else {
            format!("/{}", container_path)
        };
        format!("docker://{}{}", self.container, path)
    }

    async fn invoke(&self, args: Vec<String>) -> Result<String> {
        let output = self
            .runner
            .capture(&self.binary, &args, &self.env, None)
            .await?;
        output.check(&format!("{} {}", self.binary, args.join(" ")))
    }
}

/// Raw session object from `mutagen sync list --template '{{json .}}'`
#[derive(Debug, Deserialize)]
struct MutagenSession {
    #[serde(default)]
    name: String,
    #[serde(default)]
    identifier: String,
    alpha: MutagenEndpoint,
    beta: MutagenEndpoint,
    #[serde(default)]
    status: String,
    #[serde(default)]
    paused: bool,
    #[serde(rename = "lastError", default)]
    last_error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MutagenEndpoint {
    #[serde(default)]
    path: String,
}

/// Map mutagen's status vocabulary onto the session state machine.
fn map_state(status: &str, paused: bool, last_error: Option<&str>) -> SyncState {
    if last_error.is_some() || status.starts_with("halted") {
        return SyncState::Failed;
    }
    if paused {
        return SyncState::Paused;
    }
    match status {
        "" | "disconnected" | "connecting" | "connecting-alpha" | "connecting-beta" => {
            SyncState::Starting
        }
        _ => SyncState::Running,
    }
}

impl SyncEngine for MutagenEngine {
    async fn create(&self, id: &str, host_path: &Path, container_path: &str) -> Result<()> {
        let args = vec![
            "sync".to_string(),
            "create".to_string(),
            "--name".to_string(),
            id.to_string(),
            "--label".to_string(),
            self.label(),
            "--sync-mode".to_string(),
            "two-way-resolved".to_string(),
            host_path.display().to_string(),
            self.beta_url(container_path),
        ];
        self.invoke(args).await?;
        tracing::info!("Created sync session {}", id);
        Ok(())
    }

    async fn pause(&self, id: &str) -> Result<()> {
        self.invoke(vec!["sync".into(), "pause".into(), id.into()])
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<()> {
        self.invoke(vec!["sync".into(), "resume".into(), id.into()])
            .await?;
        Ok(())
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        self.invoke(vec!["sync".into(), "terminate".into(), id.into()])
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EngineSession>> {
        let args = vec![
            "sync".to_string(),
            "list".to_string(),
            "--label-selector".to_string(),
            self.label(),
            "--template".to_string(),
            "{{json .}}".to_string(),
        ];
        let stdout = self.invoke(args).await?;
        let stdout = stdout.trim();
        if stdout.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<MutagenSession> = serde_json::from_str(stdout)?;
        let sessions = raw
            .into_iter()
            .map(|s| {
                let state = map_state(&s.status, s.paused, s.last_error.as_deref());
                let id = if s.name.is_empty() { s.identifier } else { s.name };
                EngineSession {
                    id,
                    host_path: PathBuf::from(s.alpha.path),
                    container_path: s.beta.path,
                    state,
                    last_error: s.last_error,
                }
            })
            .collect();
        Ok(sessions)
    }
}
