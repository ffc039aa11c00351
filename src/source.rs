use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::transcript::Transcript;

/// Caption track selection policy, passed through to the source verbatim.
///
/// Which track wins (manual vs auto-generated, which language) is a caller
/// decision, not something this crate hardcodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSelection {
    /// Accepted language codes, in preference order (e.g. `["en", "en-US"]`).
    pub languages: Vec<String>,

    /// Prefer manually-created tracks over auto-generated ones when both exist.
    pub prefer_manual: bool,
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            prefer_manual: true,
        }
    }
}

/// Why a transcript fetch failed.
///
/// The split matters for retry policy: an unreachable source is worth retrying
/// with backoff, a video with no captions never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The video exists but has no usable caption track.
    NoCaptions,
    /// The source could not be reached or answered abnormally.
    Unreachable,
}

/// Error returned by [`TranscriptSource::fetch`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FetchFailure,
    pub message: String,
}

impl FetchError {
    pub fn no_captions(message: impl Into<String>) -> Self {
        Self {
            kind: FetchFailure::NoCaptions,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: FetchFailure::Unreachable,
            message: message.into(),
        }
    }

    /// Whether the pipeline may retry this fetch.
    pub fn is_transient(&self) -> bool {
        self.kind == FetchFailure::Unreachable
    }
}

/// Where transcripts come from.
///
/// This is an injected capability with one method, so tests can supply
/// in-memory transcripts and production can talk to a captions service.
/// The boxed future keeps the trait object-safe.
pub trait TranscriptSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        video: &'a str,
        tracks: &'a TrackSelection,
    ) -> BoxFuture<'a, Result<Transcript, FetchError>>;
}
