use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkParams;
use crate::score::ScoreWeights;
use crate::selector::SelectParams;
use crate::source::TrackSelection;
use crate::{Error, Result};

/// Options that control one processing session.
///
/// This struct represents *library-level configuration*, not CLI flags or HTTP
/// request fields directly. Frontends map user input into this type so that
/// the pipeline remains reusable outside any particular transport, and tests
/// can construct options programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipOptions {
    /// Upper bound on selected clips per session.
    pub max_clips: usize,

    /// Shortest acceptable clip.
    pub min_duration_seconds: f64,

    /// Longest acceptable clip.
    pub max_duration_seconds: f64,

    /// Offset between consecutive candidate-window starts. Must stay below
    /// `max_duration_seconds` so windows overlap.
    pub stride_seconds: f64,

    /// Minimum silence left between two selected clips' boundaries.
    pub min_gap_seconds: f64,

    /// Composite-score axis weights.
    pub weights: ScoreWeights,

    /// Jaccard similarity at or above which a candidate counts as a
    /// near-duplicate of an already-selected clip. `1.0` disables the filter.
    pub similarity_threshold: f64,

    /// Caption track selection policy, forwarded to the transcript source.
    pub tracks: TrackSelection,

    /// Minimum spacing between scoring-oracle requests.
    #[serde(with = "secs_f64")]
    pub oracle_interval: Duration,

    /// Upper bound on a single oracle call.
    #[serde(with = "secs_f64")]
    pub oracle_timeout: Duration,

    /// Retry policy for transient failures (oracle calls, transcript fetch).
    pub retry: RetryPolicy,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self {
            max_clips: 3,
            min_duration_seconds: 15.0,
            max_duration_seconds: 60.0,
            stride_seconds: 30.0,
            min_gap_seconds: 5.0,
            weights: ScoreWeights::default(),
            similarity_threshold: 0.7,
            tracks: TrackSelection::default(),
            oracle_interval: Duration::from_secs(1),
            oracle_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClipOptions {
    /// Reject incoherent options before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_clips == 0 || self.max_clips > 10 {
            return Err(Error::InvalidOptions(format!(
                "max_clips must be between 1 and 10, got {}",
                self.max_clips
            )));
        }
        if !(self.min_duration_seconds > 0.0 && self.min_duration_seconds.is_finite()) {
            return Err(Error::InvalidOptions(
                "min_duration_seconds must be positive".into(),
            ));
        }
        if self.max_duration_seconds < self.min_duration_seconds {
            return Err(Error::InvalidOptions(format!(
                "max_duration_seconds {} is below min_duration_seconds {}",
                self.max_duration_seconds, self.min_duration_seconds
            )));
        }
        if !(self.stride_seconds > 0.0 && self.stride_seconds < self.max_duration_seconds) {
            return Err(Error::InvalidOptions(format!(
                "stride_seconds must be positive and below max_duration_seconds, got {}",
                self.stride_seconds
            )));
        }
        if self.min_gap_seconds < 0.0 || !self.min_gap_seconds.is_finite() {
            return Err(Error::InvalidOptions(
                "min_gap_seconds must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidOptions(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.weights.sum() <= 0.0 {
            return Err(Error::InvalidOptions(
                "score weights must sum to a positive value".into(),
            ));
        }
        if self.oracle_timeout.is_zero() {
            return Err(Error::InvalidOptions(
                "oracle_timeout must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidOptions(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            min_duration_seconds: self.min_duration_seconds,
            max_duration_seconds: self.max_duration_seconds,
            stride_seconds: self.stride_seconds,
        }
    }

    pub fn select_params(&self) -> SelectParams {
        SelectParams {
            max_clips: self.max_clips,
            min_gap_seconds: self.min_gap_seconds,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,

    #[serde(with = "secs_f64")]
    pub initial_backoff: Duration,

    /// Cap on a single backoff sleep.
    #[serde(with = "secs_f64")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Sleep before attempt `attempt + 1`, doubling per failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let backoff = self.initial_backoff.saturating_mul(1u32 << shift);
        backoff.min(self.max_backoff)
    }
}

/// Serialize `Duration` fields as fractional seconds, the unit every other
/// duration in the options already uses.
mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(serde::de::Error::custom("expected non-negative seconds"));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}
