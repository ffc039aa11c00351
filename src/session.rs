use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunker::CandidateWindow;
use crate::error::{Error, ErrorKind};
use crate::selector::SelectedClip;
use crate::transcript::Transcript;

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of one processing session.
///
/// Transitions are strictly forward; `Failed` and `Cancelled` are reachable
/// from every non-terminal state. Retrying the current stage does not change
/// the externally observed state, so there is no backward edge to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    FetchingTranscript,
    Chunking,
    Scoring,
    Selecting,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Created, FetchingTranscript)
                | (FetchingTranscript, Chunking)
                | (Chunking, Scoring)
                | (Scoring, Selecting)
                | (Selecting, Completed)
        )
    }
}

/// Failure recorded on a session: the stable error kind plus a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for SessionError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One end-to-end processing run for a single source video.
///
/// The only mutable aggregate in the crate, and it is mutated exclusively by
/// the pipeline task that owns its id. Everyone else sees cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub video: String,
    pub state: SessionState,
    pub transcript: Option<Transcript>,
    pub candidates: Vec<CandidateWindow>,
    pub scored_count: usize,
    pub selected_clips: Vec<SelectedClip>,
    pub error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(id: SessionId, video: impl Into<String>) -> Self {
        Self {
            id,
            video: video.into(),
            state: SessionState::Created,
            transcript: None,
            candidates: Vec::new(),
            scored_count: 0,
            selected_clips: Vec::new(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`, stamping `finished_at` on terminal entry.
    ///
    /// Legality is the caller's responsibility (the pipeline only requests
    /// forward transitions); the debug assertion catches orchestrator bugs in
    /// tests without burdening release builds.
    pub fn enter(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }
}
