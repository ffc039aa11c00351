//! Concurrent session storage.
//!
//! An explicit key-to-session map with create/read/cancel/evict operations,
//! no implicit global registry. Lifecycle policy (when to evict, whether to
//! persist) belongs to the caller; the store only guarantees consistent
//! snapshots and ordered event delivery per session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;

use crate::progress::{EVENT_CAPACITY, PartialResult, ProgressEvent, ProgressStream};
use crate::session::{Session, SessionError, SessionId, SessionState};

/// Everything the pipeline needs to own one session: the aggregate, its
/// event channel, and its cancellation token.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    session: Arc<RwLock<Session>>,
    events: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    /// Mutate the session without a state transition (stage outputs).
    pub(crate) async fn update(&self, f: impl FnOnce(&mut Session)) {
        let mut session = self.session.write().await;
        f(&mut session);
    }

    /// Enter `next` and emit the matching progress event.
    ///
    /// Mutation and emission happen under one write-lock hold, so a
    /// concurrent subscriber either sees the old state (and receives this
    /// event live) or the new state (as its synthetic head event), never a
    /// gap or a reorder.
    pub(crate) async fn transition(
        &self,
        next: SessionState,
        message: impl Into<String>,
        partial: Option<PartialResult>,
        error: Option<SessionError>,
    ) {
        let mut session = self.session.write().await;
        session.enter(next);
        if let Some(err) = &error {
            session.error = Some(err.clone());
        }

        let event = ProgressEvent {
            session_id: session.id,
            state: next,
            message: message.into(),
            partial,
            error,
        };

        // No subscribers is fine; events are not required to be observed.
        let _ = self.events.send(event);
    }
}

/// Concurrent mapping from session id to live session.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn create(&self, video: &str) -> (SessionId, SessionHandle) {
        let id = SessionId::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = SessionHandle {
            session: Arc::new(RwLock::new(Session::new(id, video))),
            events,
            cancel: CancellationToken::new(),
        };
        self.inner.write().await.insert(id, handle.clone());
        (id, handle)
    }

    async fn handle(&self, id: SessionId) -> Option<SessionHandle> {
        self.inner.read().await.get(&id).cloned()
    }

    /// A consistent snapshot of the session, if it exists.
    pub async fn snapshot(&self, id: SessionId) -> Option<Session> {
        let handle = self.handle(id).await?;
        Some(handle.snapshot().await)
    }

    /// Subscribe to a session's progress.
    ///
    /// The returned stream first yields a synthetic event reflecting the
    /// session's current state, then live events until a terminal state.
    pub async fn subscribe(&self, id: SessionId) -> Option<ProgressStream> {
        let handle = self.handle(id).await?;

        // Read lock excludes transitions, so the synthetic event and the
        // receiver's start position are consistent with each other.
        let session = handle.session.read().await;
        let rx = handle.events.subscribe();
        let synthetic = synthetic_event(&session);
        drop(session);

        Some(ProgressStream::new(synthetic, rx))
    }

    /// Request cancellation. Returns `false` for an unknown session.
    ///
    /// Cancellation is cooperative: the pipeline honors the flag at the next
    /// stage boundary or between oracle calls. Cancelling a session that
    /// already reached a terminal state is a no-op.
    pub async fn cancel(&self, id: SessionId) -> bool {
        match self.handle(id).await {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the session, returning its final snapshot.
    ///
    /// Eviction does not cancel a running session; callers who want both
    /// cancel first.
    pub async fn evict(&self, id: SessionId) -> Option<Session> {
        let handle = self.inner.write().await.remove(&id)?;
        Some(handle.snapshot().await)
    }
}

fn synthetic_event(session: &Session) -> ProgressEvent {
    let partial = match session.state {
        SessionState::Completed => Some(PartialResult::Clips {
            clips: session.selected_clips.clone(),
        }),
        _ => None,
    };

    ProgressEvent {
        session_id: session.id,
        state: session.state,
        message: describe(session.state).to_string(),
        partial,
        error: session.error.clone(),
    }
}

fn describe(state: SessionState) -> &'static str {
    match state {
        SessionState::Created => "session created",
        SessionState::FetchingTranscript => "fetching transcript",
        SessionState::Chunking => "chunking transcript into candidate windows",
        SessionState::Scoring => "scoring candidate windows",
        SessionState::Selecting => "selecting clips",
        SessionState::Completed => "processing complete",
        SessionState::Failed => "processing failed",
        SessionState::Cancelled => "processing cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_snapshot_roundtrips() {
        let store = SessionStore::new();
        let (id, _handle) = store.create("vid-123").await;

        let snapshot = store.snapshot(id).await.expect("session exists");
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.video, "vid-123");
        assert_eq!(snapshot.state, SessionState::Created);
    }

    #[tokio::test]
    async fn unknown_ids_return_none_or_false() {
        let store = SessionStore::new();
        let id = SessionId::new();

        assert!(store.snapshot(id).await.is_none());
        assert!(store.subscribe(id).await.is_none());
        assert!(!store.cancel(id).await);
        assert!(store.evict(id).await.is_none());
    }

    #[tokio::test]
    async fn late_subscriber_gets_synthetic_event_then_live_events() {
        let store = SessionStore::new();
        let (_, handle) = store.create("vid").await;

        handle
            .transition(SessionState::FetchingTranscript, "fetching", None, None)
            .await;

        let mut stream = store
            .subscribe(handle.snapshot().await.id)
            .await
            .expect("subscribed");

        let head = stream.next().await.expect("synthetic event");
        assert_eq!(head.state, SessionState::FetchingTranscript);

        handle
            .transition(SessionState::Chunking, "chunking", None, None)
            .await;
        let live = stream.next().await.expect("live event");
        assert_eq!(live.state, SessionState::Chunking);
    }

    #[tokio::test]
    async fn subscriber_after_terminal_state_sees_exactly_one_event() {
        let store = SessionStore::new();
        let (id, handle) = store.create("vid").await;

        handle
            .transition(
                SessionState::Cancelled,
                "processing cancelled",
                None,
                None,
            )
            .await;

        let mut stream = store.subscribe(id).await.expect("subscribed");
        let head = stream.next().await.expect("synthetic event");
        assert_eq!(head.state, SessionState::Cancelled);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn evict_returns_final_snapshot_and_forgets_the_id() {
        let store = SessionStore::new();
        let (id, handle) = store.create("vid").await;
        handle
            .transition(SessionState::Failed, "boom", None, None)
            .await;

        let evicted = store.evict(id).await.expect("final snapshot");
        assert_eq!(evicted.state, SessionState::Failed);
        assert!(store.snapshot(id).await.is_none());
    }

    #[tokio::test]
    async fn cancel_flags_the_token() {
        let store = SessionStore::new();
        let (id, handle) = store.create("vid").await;

        assert!(!handle.cancel_token().is_cancelled());
        assert!(store.cancel(id).await);
        assert!(handle.cancel_token().is_cancelled());
    }
}
