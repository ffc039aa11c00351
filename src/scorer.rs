//! Candidate scoring against the oracle.
//!
//! One oracle request per candidate, serialized through the rate limiter.
//! Transient failures (timeouts, transport errors, unparseable or
//! out-of-range judgments) retry with bounded exponential backoff; a
//! candidate that exhausts its retries is dropped and logged, never kept
//! with a null score. The stage only fails outright when *every* candidate
//! fails.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chunker::CandidateWindow;
use crate::options::RetryPolicy;
use crate::oracle::{OracleRequest, ScoringOracle};
use crate::rate_limit::RateLimiter;
use crate::score::{Score, ScoreWeights, ScoredCandidate};
use crate::transcript::Transcript;
use crate::{Error, Result};

/// Segments of surrounding context sent with each candidate, per side.
const CONTEXT_SEGMENTS: usize = 2;

/// Cap on each side's context text, so oversized cues can't blow up requests.
const CONTEXT_MAX_CHARS: usize = 500;

/// Drives the scoring stage for one session.
pub struct Scorer<O> {
    oracle: Arc<O>,
    limiter: Arc<RateLimiter>,
    weights: ScoreWeights,
    oracle_timeout: Duration,
    retry: RetryPolicy,
}

impl<O: ScoringOracle> Scorer<O> {
    pub fn new(
        oracle: Arc<O>,
        limiter: Arc<RateLimiter>,
        weights: ScoreWeights,
        oracle_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            oracle,
            limiter,
            weights,
            oracle_timeout,
            retry,
        }
    }

    /// Score every candidate, dropping the ones that permanently fail.
    ///
    /// Cancellation is honored between oracle calls: an in-flight call is
    /// allowed to finish, the next one is never started.
    pub async fn score_all(
        &self,
        transcript: &Transcript,
        candidates: &[CandidateWindow],
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredCandidate>> {
        let mut scored = Vec::with_capacity(candidates.len());
        let mut dropped = 0usize;

        for (idx, window) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.score_candidate(transcript, window, cancel).await? {
                Some(score) => scored.push(ScoredCandidate {
                    window: window.clone(),
                    score,
                }),
                None => {
                    dropped += 1;
                    warn!(
                        candidate = idx,
                        start_seconds = window.start_seconds,
                        end_seconds = window.end_seconds,
                        "dropping candidate after exhausting scoring retries"
                    );
                }
            }
        }

        if scored.is_empty() && !candidates.is_empty() {
            return Err(Error::Scoring(format!(
                "all {dropped} candidates failed scoring"
            )));
        }

        Ok(scored)
    }

    /// Score one candidate under the retry policy.
    ///
    /// `Ok(None)` means the candidate is dropped; `Err` is reserved for
    /// cancellation, which aborts the whole stage.
    async fn score_candidate(
        &self,
        transcript: &Transcript,
        window: &CandidateWindow,
        cancel: &CancellationToken,
    ) -> Result<Option<Score>> {
        let (context_before, context_after) = surrounding_context(transcript, window);

        for attempt in 0..self.retry.max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.limiter.acquire().await;

            let request = OracleRequest {
                candidate_text: &window.text,
                context_before: &context_before,
                context_after: &context_after,
            };

            let outcome =
                match tokio::time::timeout(self.oracle_timeout, self.oracle.evaluate(request))
                    .await
                {
                    Err(_) => Err(Error::Scoring(format!(
                        "oracle call exceeded {:.1}s timeout",
                        self.oracle_timeout.as_secs_f64()
                    ))),
                    Ok(result) => result,
                };

            match outcome {
                Ok(judgment) if judgment.axes_in_range() => {
                    debug!(
                        start_seconds = window.start_seconds,
                        attempt, "candidate scored"
                    );
                    return Ok(Some(Score::new(
                        judgment.hook,
                        judgment.value,
                        judgment.standalone,
                        judgment.emotional,
                        judgment.reasoning,
                        &self.weights,
                    )));
                }
                Ok(judgment) => {
                    warn!(
                        attempt,
                        ?judgment,
                        "oracle returned axes outside [0, 1], treating as scoring failure"
                    );
                }
                Err(err) => {
                    warn!(attempt, error = %err, "oracle call failed");
                }
            }

            if attempt + 1 < self.retry.max_attempts {
                tokio::time::sleep(self.retry.backoff_after(attempt)).await;
            }
        }

        Ok(None)
    }
}

/// Up to [`CONTEXT_SEGMENTS`] whole segments on each side of the window,
/// capped at [`CONTEXT_MAX_CHARS`] per side.
fn surrounding_context(transcript: &Transcript, window: &CandidateWindow) -> (String, String) {
    let segments = transcript.segments();
    let range = &window.source_segments;

    let before_start = range.start.saturating_sub(CONTEXT_SEGMENTS);
    let before = crate::transcript::join_segment_text(&segments[before_start..range.start]);

    let after_end = (range.end + CONTEXT_SEGMENTS).min(segments.len());
    let after = crate::transcript::join_segment_text(&segments[range.end..after_end]);

    (tail_chars(&before, CONTEXT_MAX_CHARS), head_chars(&after, CONTEXT_MAX_CHARS))
}

fn head_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{FailingOracle, OracleJudgment, ScriptedOracle};
    use crate::transcript::TranscriptSegment;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
        }
    }

    fn transcript() -> Transcript {
        Transcript::new(vec![
            seg(0.0, 10.0, "intro"),
            seg(10.0, 20.0, "the good part"),
            seg(20.0, 30.0, "outro"),
        ])
        .expect("valid transcript")
    }

    fn window(range: std::ops::Range<usize>, start: f64, end: f64, text: &str) -> CandidateWindow {
        CandidateWindow {
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
            source_segments: range,
        }
    }

    fn judgment(hook: f64) -> OracleJudgment {
        OracleJudgment {
            hook,
            value: 0.5,
            standalone: 0.5,
            emotional: 0.5,
            reasoning: "test".to_string(),
        }
    }

    fn scorer<O: ScoringOracle>(oracle: O) -> Scorer<O> {
        Scorer::new(
            Arc::new(oracle),
            Arc::new(RateLimiter::new(Duration::from_millis(10))),
            ScoreWeights::default(),
            Duration::from_secs(5),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn scoring_is_idempotent_with_a_deterministic_oracle() -> anyhow::Result<()> {
        let t = transcript();
        let windows = vec![window(1..2, 10.0, 20.0, "the good part")];
        let s = scorer(ScriptedOracle::new().with_fallback(judgment(0.8)));
        let cancel = CancellationToken::new();

        let first = s.score_all(&t, &windows, &cancel).await?;
        let second = s.score_all(&t, &windows, &cancel).await?;

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].score.composite, second[0].score.composite);
        assert_eq!(first[0].score.reasoning, second[0].score.reasoning);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn all_candidates_failing_fails_the_stage() {
        let t = transcript();
        let windows = vec![
            window(0..1, 0.0, 10.0, "intro"),
            window(1..2, 10.0, 20.0, "the good part"),
        ];
        let s = scorer(FailingOracle);

        let err = s
            .score_all(&t, &windows, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Scoring(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_candidates_are_dropped_not_nulled() -> anyhow::Result<()> {
        let t = transcript();
        let windows = vec![
            window(0..1, 0.0, 10.0, "intro"),
            window(1..2, 10.0, 20.0, "the good part"),
        ];
        // Only the second candidate has a judgment; the first exhausts retries.
        let s = scorer(ScriptedOracle::new().with("the good part", judgment(0.9)));

        let scored = s.score_all(&t, &windows, &CancellationToken::new()).await?;
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].window.text, "the good part");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_axes_are_failures_not_clamped() -> anyhow::Result<()> {
        let t = transcript();
        let windows = vec![
            window(0..1, 0.0, 10.0, "intro"),
            window(1..2, 10.0, 20.0, "the good part"),
        ];
        let s = scorer(
            ScriptedOracle::new()
                .with("intro", judgment(1.5))
                .with("the good part", judgment(0.9)),
        );

        let scored = s.score_all(&t, &windows, &CancellationToken::new()).await?;
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].window.text, "the good part");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_the_next_call() {
        let t = transcript();
        let windows = vec![window(0..1, 0.0, 10.0, "intro")];
        let s = scorer(ScriptedOracle::new().with_fallback(judgment(0.5)));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = s.score_all(&t, &windows, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn context_is_bounded_neighborhood() {
        let t = transcript();
        let w = window(1..2, 10.0, 20.0, "the good part");
        let (before, after) = surrounding_context(&t, &w);
        assert_eq!(before, "intro");
        assert_eq!(after, "outro");

        let w = window(0..3, 0.0, 30.0, "everything");
        let (before, after) = surrounding_context(&t, &w);
        assert!(before.is_empty());
        assert!(after.is_empty());
    }

    #[test]
    fn context_caps_per_side_length() {
        let long = "x".repeat(2000);
        let t = Transcript::new(vec![
            seg(0.0, 10.0, &long),
            seg(10.0, 20.0, "candidate"),
            seg(20.0, 30.0, &long),
        ])
        .expect("valid transcript");

        let w = window(1..2, 10.0, 20.0, "candidate");
        let (before, after) = surrounding_context(&t, &w);
        assert_eq!(before.chars().count(), CONTEXT_MAX_CHARS);
        assert_eq!(after.chars().count(), CONTEXT_MAX_CHARS);
    }
}
