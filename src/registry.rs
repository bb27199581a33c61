//! Tracks the active calls a process is handling, each bound to its own
//! [`crate::orchestrator::OrchestratorHandle`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::carrier::CarrierAdapter;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::frame::AudioFrame;
use crate::orchestrator::{OrchestratorHandle, PipelineOrchestrator};
use crate::session::{CallSession, Direction, SessionStatus};

struct Entry {
    session: CallSession,
    handle: OrchestratorHandle,
}

/// Owns the call id → orchestrator map for a process. Operations on a
/// session id that isn't present return [`PipelineError::SessionGone`]
/// rather than panicking — calls can end out from under a caller at
/// any time.
#[derive(Clone)]
pub struct SessionRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Start a new call pipeline and register it under `id`.
    pub async fn create_session(
        &self,
        id: impl Into<String>,
        direction: Direction,
        config: PipelineConfig,
        carrier: Box<dyn CarrierAdapter>,
    ) -> Result<(), PipelineError> {
        let id = id.into();
        let mut session = CallSession::new(id.clone(), direction);
        session.transition(SessionStatus::InProgress);

        let handle = PipelineOrchestrator::start(config, carrier);

        let mut entries = self.entries.write().await;
        entries.insert(id, Entry { session, handle });
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<CallSession, PipelineError> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .map(|e| e.session.clone())
            .ok_or_else(|| PipelineError::SessionGone(id.to_string()))
    }

    pub async fn push_ingress(&self, id: &str, frame: AudioFrame) -> Result<(), PipelineError> {
        let entries = self.entries.read().await;
        let entry = entries.get(id).ok_or_else(|| PipelineError::SessionGone(id.to_string()))?;
        entry.handle.push_ingress(frame)
    }

    /// Stop and remove a session. Idempotent: terminating an
    /// already-gone session is a `SessionGone` error, not a panic.
    pub async fn terminate(&self, id: &str) -> Result<(), PipelineError> {
        let mut entries = self.entries.write().await;
        let mut entry = entries.remove(id).ok_or_else(|| PipelineError::SessionGone(id.to_string()))?;
        entry.handle.stop();
        entry.session.transition(SessionStatus::Completed);
        Ok(())
    }

    pub async fn active_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::LoopbackAdapter;

    #[tokio::test]
    async fn create_then_get_returns_in_progress_session() {
        let registry = SessionRegistry::new();
        let (adapter, _egress_rx) = LoopbackAdapter::new(8);
        registry
            .create_session("call-1", Direction::Inbound, PipelineConfig::default(), Box::new(adapter))
            .await
            .unwrap();

        let session = registry.get("call-1").await.unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        registry.terminate("call-1").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_session_is_session_gone() {
        let registry = SessionRegistry::new();
        assert!(matches!(registry.get("missing").await, Err(PipelineError::SessionGone(_))));
        assert!(matches!(registry.terminate("missing").await, Err(PipelineError::SessionGone(_))));
    }

    #[tokio::test]
    async fn terminate_removes_from_active_count() {
        let registry = SessionRegistry::new();
        let (adapter, _egress_rx) = LoopbackAdapter::new(8);
        registry
            .create_session("call-2", Direction::Outbound, PipelineConfig::default(), Box::new(adapter))
            .await
            .unwrap();
        assert_eq!(registry.active_count().await, 1);

        registry.terminate("call-2").await.unwrap();
        assert_eq!(registry.active_count().await, 0);
    }
}
