//! Live publication sessions
//!
//! One [`PublicationSession`] per draft, each behind its own mutex. Steps
//! take the lock with `try_lock`, so a second trigger while a step is running
//! is rejected instead of queued. Sessions idle longer than the configured
//! limit are evicted; their checkpoint remains the way back in.

use crate::autosave::AutoSave;
use crate::compose::ComposeInput;
use crate::errors::PublishError;
use crate::pipeline::PipelineState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

/// Checkpointed form of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub draft_id: Uuid,
    pub author_id: Uuid,
    pub compose: ComposeInput,
    pub state: PipelineState,
}

/// A draft moving through the pipeline
pub struct PublicationSession {
    draft_id: Uuid,
    author_id: Uuid,
    compose: watch::Sender<ComposeInput>,
    state: PipelineState,
    autosave: Option<AutoSave>,
    last_active: Instant,
}

impl PublicationSession {
    pub fn new(draft_id: Uuid, author_id: Uuid, compose: ComposeInput, state: PipelineState) -> Self {
        let (compose, _) = watch::channel(compose);
        Self {
            draft_id,
            author_id,
            compose,
            state,
            autosave: None,
            last_active: Instant::now(),
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self::new(
            snapshot.draft_id,
            snapshot.author_id,
            snapshot.compose,
            snapshot.state,
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            draft_id: self.draft_id,
            author_id: self.author_id,
            compose: self.compose(),
            state: self.state.clone(),
        }
    }

    pub fn draft_id(&self) -> Uuid {
        self.draft_id
    }

    pub fn author_id(&self) -> Uuid {
        self.author_id
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn compose(&self) -> ComposeInput {
        self.compose.borrow().clone()
    }

    /// Replace the compose fields; auto-save picks them up on its next tick
    pub fn set_compose(&self, compose: ComposeInput) {
        self.compose.send_replace(compose);
    }

    pub fn subscribe(&self) -> watch::Receiver<ComposeInput> {
        self.compose.subscribe()
    }

    pub fn has_autosave(&self) -> bool {
        self.autosave.is_some()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub(crate) fn set_state(&mut self, state: PipelineState) {
        self.state = state;
    }

    pub(crate) fn set_autosave(&mut self, autosave: AutoSave) {
        self.autosave = Some(autosave);
    }

    pub(crate) fn take_autosave(&mut self) -> Option<AutoSave> {
        self.autosave.take()
    }
}

pub type SessionHandle = Arc<Mutex<PublicationSession>>;

/// Draft id → live session
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session; an existing one for the same draft wins
    pub async fn insert(&self, session: PublicationSession) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session.draft_id())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone()
    }

    pub async fn get(&self, draft_id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&draft_id).cloned()
    }

    pub async fn remove(&self, draft_id: Uuid) -> bool {
        self.sessions.write().await.remove(&draft_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Unregister sessions idle for at least `max_idle`
    ///
    /// Sessions locked by a running step are skipped.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();
        sessions.retain(|_, handle| {
            let idle = match handle.try_lock() {
                Ok(session) => session.idle_for() >= max_idle,
                Err(_) => false,
            };
            if idle {
                evicted.push(handle.clone());
            }
            !idle
        });
        evicted
    }

    /// Lock a session for one step, failing if another step holds it
    pub fn try_acquire(
        handle: SessionHandle,
        draft_id: Uuid,
    ) -> Result<OwnedMutexGuard<PublicationSession>, PublishError> {
        handle
            .try_lock_owned()
            .map_err(|_| PublishError::StepInFlight { draft_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(draft_id: Uuid) -> PublicationSession {
        PublicationSession::new(
            draft_id,
            Uuid::new_v4(),
            ComposeInput {
                title: "Krump".to_string(),
                ..Default::default()
            },
            PipelineState::Draft,
        )
    }

    #[tokio::test]
    async fn test_insert_keeps_existing_session() {
        let registry = SessionRegistry::new();
        let draft_id = Uuid::new_v4();

        let first = registry.insert(session(draft_id)).await;
        first.lock().await.set_compose(ComposeInput {
            title: "Edited".to_string(),
            ..Default::default()
        });

        let second = registry.insert(session(draft_id)).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.compose().title, "Edited");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected() {
        let registry = SessionRegistry::new();
        let draft_id = Uuid::new_v4();
        let handle = registry.insert(session(draft_id)).await;

        let _held = SessionRegistry::try_acquire(handle.clone(), draft_id).unwrap();
        assert!(matches!(
            SessionRegistry::try_acquire(handle, draft_id),
            Err(PublishError::StepInFlight { draft_id: id }) if id == draft_id
        ));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let draft_id = Uuid::new_v4();
        let original = session(draft_id);
        let snapshot = original.snapshot();

        let value = serde_json::to_value(&snapshot).unwrap();
        let restored: SessionSnapshot = serde_json::from_value(value).unwrap();
        let resumed = PublicationSession::from_snapshot(restored);

        assert_eq!(resumed.snapshot(), snapshot);
        assert!(!resumed.has_autosave());
    }

    #[tokio::test]
    async fn test_evict_idle_skips_busy_and_recent_sessions() {
        let registry = SessionRegistry::new();
        let idle = Uuid::new_v4();
        let busy = Uuid::new_v4();
        registry.insert(session(idle)).await;
        let busy_handle = registry.insert(session(busy)).await;

        assert!(registry.evict_idle(Duration::from_secs(3600)).await.is_empty());
        assert_eq!(registry.len().await, 2);

        let _running = busy_handle.lock().await;
        let evicted = registry.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].lock().await.draft_id(), idle);
        assert!(registry.get(idle).await.is_none());
        assert!(registry.get(busy).await.is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new();
        let draft_id = Uuid::new_v4();
        registry.insert(session(draft_id)).await;

        assert!(registry.remove(draft_id).await);
        assert!(registry.get(draft_id).await.is_none());
        assert!(registry.is_empty().await);
    }
}
