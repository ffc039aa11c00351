//! Ordered progress delivery.
//!
//! Progress is message passing over a per-session broadcast channel, not
//! callbacks: ordering is the channel's ordering, and replay-on-reconnect is
//! a synthetic head event rather than history replay. The transport that
//! carries events to an actual client (SSE, polling, a log) is external.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::selector::SelectedClip;
use crate::session::{SessionError, SessionId, SessionState};

/// Buffered events per session channel. A slow subscriber past this lags and
/// skips ahead rather than stalling the pipeline.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Stage output carried on a progress event, when the stage has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartialResult {
    Candidates { count: usize },
    Scored { scored: usize, dropped: usize },
    Clips { clips: Vec<SelectedClip> },
}

/// Immutable record of one state transition.
///
/// Events are constructed in transition order and delivered in that order;
/// a `Completed` event carries the final clips, a `Failed` event the error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: SessionId,
    pub state: SessionState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
}

/// A finite sequence of progress events for one session.
///
/// The first event is synthetic, reflecting the session state at subscribe
/// time, so a late or reconnecting subscriber never misses where things
/// stand. The stream ends after delivering a terminal-state event.
pub struct ProgressStream {
    initial: Option<ProgressEvent>,
    rx: broadcast::Receiver<ProgressEvent>,
    done: bool,
}

impl ProgressStream {
    pub(crate) fn new(initial: ProgressEvent, rx: broadcast::Receiver<ProgressEvent>) -> Self {
        Self {
            initial: Some(initial),
            rx,
            done: false,
        }
    }

    /// The next event, or `None` once the session reached a terminal state.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }

        if let Some(event) = self.initial.take() {
            if event.state.is_terminal() {
                self.done = true;
            }
            return Some(event);
        }

        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.state.is_terminal() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(state: SessionState) -> ProgressEvent {
        ProgressEvent {
            session_id: SessionId::new(),
            state,
            message: "test".to_string(),
            partial: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn synthetic_head_event_comes_first() {
        let (tx, rx) = broadcast::channel(EVENT_CAPACITY);
        let mut stream = ProgressStream::new(event(SessionState::Chunking), rx);

        tx.send(event(SessionState::Scoring)).expect("send");

        let first = stream.next().await.expect("head event");
        assert_eq!(first.state, SessionState::Chunking);

        let second = stream.next().await.expect("live event");
        assert_eq!(second.state, SessionState::Scoring);
    }

    #[tokio::test]
    async fn stream_ends_after_terminal_event() {
        let (tx, rx) = broadcast::channel(EVENT_CAPACITY);
        let mut stream = ProgressStream::new(event(SessionState::Created), rx);

        tx.send(event(SessionState::Failed)).expect("send");
        tx.send(event(SessionState::Created)).expect("send");

        assert_eq!(
            stream.next().await.expect("head").state,
            SessionState::Created
        );
        assert_eq!(
            stream.next().await.expect("failure").state,
            SessionState::Failed
        );
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn terminal_synthetic_event_ends_the_stream_immediately() {
        let (_tx, rx) = broadcast::channel::<ProgressEvent>(EVENT_CAPACITY);
        let mut stream = ProgressStream::new(event(SessionState::Completed), rx);

        assert_eq!(
            stream.next().await.expect("head").state,
            SessionState::Completed
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn closed_channel_ends_the_stream() {
        let (tx, rx) = broadcast::channel::<ProgressEvent>(EVENT_CAPACITY);
        let mut stream = ProgressStream::new(event(SessionState::Created), rx);
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn events_serialize_without_empty_fields() -> anyhow::Result<()> {
        let json = serde_json::to_string(&event(SessionState::Scoring))?;
        assert!(!json.contains("partial"));
        assert!(!json.contains("error"));
        assert!(json.contains("\"scoring\""));
        Ok(())
    }
}
