//! Sync session lifecycle
//!
//! State machine: Stopped → Starting → Running ⇄ Paused; any of
//! {Starting, Running, Paused} → Failed on engine error; Failed → Stopped
//! only via explicit stop. The engine daemon is the source of truth, so
//! every transition re-checks the daemon's view first; sessions started by
//! other processes are visible and controllable.

use super::engine::{EngineSession, SyncEngine};
use super::session::{SyncSession, SyncState};
use crate::error::{OrodcError, Result};
use std::path::Path;

/// Drives sync session transitions against a [`SyncEngine`]
pub struct SyncManager<E: SyncEngine> {
    engine: E,
}

impl<E: SyncEngine> SyncManager<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Start a session mirroring `host_path` into `container_path`.
    ///
    /// Idempotent when an equivalent session is already Starting or
    /// Running: the existing session is returned and no duplicate is
    /// created. A Paused or Failed equivalent must be resumed or stopped
    /// explicitly.
    pub async fn start(&self, host_path: &Path, container_path: &str) -> Result<SyncSession> {
        let sessions = self.engine.list().await?;
        if let Some(existing) = sessions
            .iter()
            .find(|s| s.host_path == host_path && s.container_path == container_path)
        {
            return match existing.state {
                SyncState::Running | SyncState::Starting => {
                    tracing::info!(
                        "Sync session {} already {}, nothing to do",
                        existing.id,
                        existing.state
                    );
                    Ok(to_session(existing))
                }
                state => Err(OrodcError::InvalidSyncState {
                    id: existing.id.clone(),
                    state: state.to_string(),
                    action: "start".to_string(),
                }),
            };
        }

        let mut session = SyncSession::new(host_path.to_path_buf(), container_path.to_string());
        self.engine
            .create(&session.id, host_path, container_path)
            .await?;
        session.state = SyncState::Starting;
        Ok(session)
    }

    /// Pause a Running session.
    pub async fn pause(&self, id: &str) -> Result<()> {
        let state = self.current_state(id).await?;
        if state != SyncState::Running {
            return Err(invalid(id, state, "pause"));
        }
        self.engine.pause(id).await
    }

    /// Resume a Paused session.
    pub async fn resume(&self, id: &str) -> Result<()> {
        let state = self.current_state(id).await?;
        if state != SyncState::Paused {
            return Err(invalid(id, state, "resume"));
        }
        self.engine.resume(id).await
    }

    /// Stop a Running, Paused or Failed session.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let state = self.current_state(id).await?;
        if !state.stoppable() {
            return Err(invalid(id, state, "stop"));
        }
        self.engine.terminate(id).await
    }

    /// Current state and last error detail for a session. A session the
    /// daemon no longer knows about is Stopped; engine failures surface
    /// here as a Failed state with the reason attached, not as an error.
    pub async fn status(&self, id: &str) -> Result<(SyncState, Option<String>)> {
        let sessions = self.engine.list().await?;
        Ok(sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| (s.state, s.last_error.clone()))
            .unwrap_or((SyncState::Stopped, None)))
    }

    /// All sessions the engine reports for this project.
    pub async fn list(&self) -> Result<Vec<EngineSession>> {
        self.engine.list().await
    }

    async fn current_state(&self, id: &str) -> Result<SyncState> {
        let (state, _) = self.status(id).await?;
        Ok(state)
    }
}

fn invalid(id: &str, state: SyncState, action: &str) -> OrodcError {
    OrodcError::InvalidSyncState {
        id: id.to_string(),
        state: state.to_string(),
        action: action.to_string(),
    }
}

fn to_session(engine_session: &EngineSession) -> SyncSession {
    SyncSession {
        id: engine_session.id.clone(),
        host_path: engine_session.host_path.clone(),
        container_path: engine_session.container_path.clone(),
        state: engine_session.state,
        last_error: engine_session.last_error.clone(),
        created_at: chrono::Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// In-memory engine with mutagen-like semantics
    #[derive(Default)]
    struct MockEngine {
        sessions: Mutex<Vec<EngineSession>>,
    }

    impl MockEngine {
        fn seed(&self, id: &str, host: &str, container: &str, state: SyncState) {
            self.sessions.lock().unwrap().push(EngineSession {
                id: id.to_string(),
                host_path: PathBuf::from(host),
                container_path: container.to_string(),
                state,
                last_error: None,
            });
        }

        fn fail(&self, id: &str, reason: &str) {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions.iter_mut().find(|s| s.id == id).unwrap();
            session.state = SyncState::Failed;
            session.last_error = Some(reason.to_string());
        }

        fn count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }
    }

    impl SyncEngine for MockEngine {
        async fn create(&self, id: &str, host_path: &Path, container_path: &str) -> Result<()> {
            self.sessions.lock().unwrap().push(EngineSession {
                id: id.to_string(),
                host_path: host_path.to_path_buf(),
                container_path: container_path.to_string(),
                state: SyncState::Running,
                last_error: None,
            });
            Ok(())
        }

        async fn pause(&self, id: &str) -> Result<()> {
            self.set_state(id, SyncState::Paused)
        }

        async fn resume(&self, id: &str) -> Result<()> {
            self.set_state(id, SyncState::Running)
        }

        async fn terminate(&self, id: &str) -> Result<()> {
            self.sessions.lock().unwrap().retain(|s| s.id != id);
            Ok(())
        }

        async fn list(&self) -> Result<Vec<EngineSession>> {
            Ok(self.sessions.lock().unwrap().clone())
        }
    }

    impl MockEngine {
        fn set_state(&self, id: &str, state: SyncState) -> Result<()> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| OrodcError::Internal(format!("no session {id}")))?;
            session.state = state;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_creates_session() {
        let manager = SyncManager::new(MockEngine::default());
        let session = manager.start(Path::new("./src"), "/app/src").await.unwrap();
        assert_eq!(session.state, SyncState::Starting);
        assert_eq!(manager.engine.count(), 1);
    }

    #[tokio::test]
    async fn test_double_start_is_idempotent() {
        let manager = SyncManager::new(MockEngine::default());
        let first = manager.start(Path::new("./src"), "/app/src").await.unwrap();
        let second = manager.start(Path::new("./src"), "/app/src").await.unwrap();
        assert_eq!(first.id, second.id);
        // exactly one underlying session
        assert_eq!(manager.engine.count(), 1);
    }

    #[tokio::test]
    async fn test_start_distinct_pair_creates_second_session() {
        let manager = SyncManager::new(MockEngine::default());
        manager.start(Path::new("./src"), "/app/src").await.unwrap();
        manager.start(Path::new("./var"), "/app/var").await.unwrap();
        assert_eq!(manager.engine.count(), 2);
    }

    #[tokio::test]
    async fn test_start_over_paused_equivalent_is_rejected() {
        let manager = SyncManager::new(MockEngine::default());
        manager.engine.seed("s1", "./src", "/app/src", SyncState::Paused);
        let err = manager.start(Path::new("./src"), "/app/src").await.unwrap_err();
        assert!(matches!(err, OrodcError::InvalidSyncState { .. }));
    }

    #[tokio::test]
    async fn test_resume_on_stopped_session_fails() {
        let manager = SyncManager::new(MockEngine::default());
        let err = manager.resume("sync-missing").await.unwrap_err();
        match err {
            OrodcError::InvalidSyncState { state, action, .. } => {
                assert_eq!(state, "stopped");
                assert_eq!(action, "resume");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let manager = SyncManager::new(MockEngine::default());
        let session = manager.start(Path::new("./src"), "/app/src").await.unwrap();

        manager.pause(&session.id).await.unwrap();
        assert_eq!(
            manager.status(&session.id).await.unwrap().0,
            SyncState::Paused
        );

        // pausing a paused session is an invalid transition
        let err = manager.pause(&session.id).await.unwrap_err();
        assert!(matches!(err, OrodcError::InvalidSyncState { .. }));

        manager.resume(&session.id).await.unwrap();
        assert_eq!(
            manager.status(&session.id).await.unwrap().0,
            SyncState::Running
        );
    }

    #[tokio::test]
    async fn test_stop_from_failed_state() {
        let manager = SyncManager::new(MockEngine::default());
        let session = manager.start(Path::new("./src"), "/app/src").await.unwrap();
        manager.engine.fail(&session.id, "conflict");

        manager.stop(&session.id).await.unwrap();
        assert_eq!(manager.engine.count(), 0);
    }

    #[tokio::test]
    async fn test_stop_on_stopped_session_fails() {
        let manager = SyncManager::new(MockEngine::default());
        let err = manager.stop("sync-missing").await.unwrap_err();
        assert!(matches!(err, OrodcError::InvalidSyncState { .. }));
    }

    #[tokio::test]
    async fn test_status_surfaces_engine_failure() {
        let manager = SyncManager::new(MockEngine::default());
        let session = manager.start(Path::new("./src"), "/app/src").await.unwrap();
        manager.engine.fail(&session.id, "beta endpoint unreachable");

        let (state, detail) = manager.status(&session.id).await.unwrap();
        assert_eq!(state, SyncState::Failed);
        assert_eq!(detail.as_deref(), Some("beta endpoint unreachable"));
    }

    #[tokio::test]
    async fn test_stop_session_started_elsewhere() {
        // session created by another process, visible via the daemon
        let manager = SyncManager::new(MockEngine::default());
        manager.engine.seed("s9", "/other/src", "/app/src", SyncState::Running);
        manager.stop("s9").await.unwrap();
        assert_eq!(manager.engine.count(), 0);
    }
}
