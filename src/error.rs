use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whittle's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Whittle's crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs. Each variant maps to one pipeline failure kind;
/// `kind()` gives the stable tag recorded on sessions and progress events.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable captions exist for the video, or the transcript source stayed
    /// unreachable after retries.
    #[error("transcript unavailable for '{video}': {reason}")]
    TranscriptUnavailable { video: String, reason: String },

    /// The transcript cannot produce any candidate window (e.g. shorter than the
    /// minimum clip duration).
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Scoring failed for every candidate, or a single candidate's scoring failed
    /// (absorbed by the scorer, surfaced only when the whole stage dies).
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// No candidate survived scoring and filtering.
    #[error("selection failed: {0}")]
    Selection(String),

    /// The session was cancelled. A distinct terminal outcome, not a failure.
    #[error("session cancelled")]
    Cancelled,

    /// Rejected before any work started.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The stable tag for an [`Error`], used when recording failures on sessions
/// and progress events without carrying the error value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TranscriptUnavailable,
    Chunking,
    Scoring,
    Selection,
    Cancelled,
    InvalidOptions,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TranscriptUnavailable { .. } => ErrorKind::TranscriptUnavailable,
            Error::Chunking(_) => ErrorKind::Chunking,
            Error::Scoring(_) => ErrorKind::Scoring,
            Error::Selection(_) => ErrorKind::Selection,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidOptions(_) => ErrorKind::InvalidOptions,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error ends a session as `Cancelled` rather than `Failed`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
