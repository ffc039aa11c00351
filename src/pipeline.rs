//! The pipeline orchestrator.
//!
//! One session = one spawned task driving `FetchingTranscript → Chunking →
//! Scoring → Selecting` strictly in order, emitting a progress event on every
//! transition, honoring cancellation at stage boundaries (and between oracle
//! calls, inside the scorer), and always landing the session on a terminal
//! state. Sessions run concurrently, bounded by a worker-pool semaphore;
//! there is no ordering guarantee across sessions.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span, warn};

use crate::chunker::chunk;
use crate::options::ClipOptions;
use crate::oracle::ScoringOracle;
use crate::progress::{PartialResult, ProgressStream};
use crate::rate_limit::RateLimiter;
use crate::scorer::Scorer;
use crate::selector::select;
use crate::session::{Session, SessionError, SessionId, SessionState};
use crate::source::TranscriptSource;
use crate::store::{SessionHandle, SessionStore};
use crate::{Error, Result};

/// Process-wide pipeline settings.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Sessions processed concurrently; further sessions queue in `Created`.
    pub max_concurrent_sessions: usize,

    /// A rate limiter shared across all sessions. When `None`, each session
    /// gets its own limiter built from its options' `oracle_interval`. Either
    /// way a session never observes less than its minimum inter-request
    /// spacing; a shared handle is simply stricter.
    pub shared_limiter: Option<Arc<RateLimiter>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            shared_limiter: None,
        }
    }
}

/// High-level entry point: owns the session store and the injected
/// collaborators, and drives each session through the stages.
pub struct Pipeline<S, O> {
    store: SessionStore,
    source: Arc<S>,
    oracle: Arc<O>,
    workers: Arc<Semaphore>,
    config: PipelineConfig,
}

impl<S, O> Clone for Pipeline<S, O> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            source: self.source.clone(),
            oracle: self.oracle.clone(),
            workers: self.workers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, O> Pipeline<S, O>
where
    S: TranscriptSource + 'static,
    O: ScoringOracle + 'static,
{
    pub fn new(source: S, oracle: O, config: PipelineConfig) -> Self {
        Self {
            store: SessionStore::new(),
            source: Arc::new(source),
            oracle: Arc::new(oracle),
            workers: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            config,
        }
    }

    /// Start processing a video. Returns immediately with the session id;
    /// progress arrives via [`Pipeline::subscribe`].
    pub async fn start_session(&self, video: &str, options: ClipOptions) -> Result<SessionId> {
        options.validate()?;

        let (id, handle) = self.store.create(video).await;
        info!(session = %id, video, "session created");

        let source = self.source.clone();
        let oracle = self.oracle.clone();
        let workers = self.workers.clone();
        let limiter = self.config.shared_limiter.clone();
        let video = video.to_string();

        let span = info_span!("session", id = %id);
        tokio::spawn(
            async move {
                // Hold a worker slot for the whole run so stages of one
                // session never interleave with its own later stages.
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        fail(&handle, &Error::Other("worker pool closed".into())).await;
                        return;
                    }
                };

                run_session(source, oracle, limiter, handle, video, options).await;
            }
            .instrument(span),
        );

        Ok(id)
    }

    /// A consistent snapshot of the session, if it exists.
    pub async fn get_session(&self, id: SessionId) -> Option<Session> {
        self.store.snapshot(id).await
    }

    /// Subscribe to a session's ordered progress events. A late subscriber
    /// first receives a synthetic event reflecting the current state.
    pub async fn subscribe(&self, id: SessionId) -> Option<ProgressStream> {
        self.store.subscribe(id).await
    }

    /// Request cooperative cancellation. Returns `false` for an unknown id.
    pub async fn cancel(&self, id: SessionId) -> bool {
        self.store.cancel(id).await
    }

    /// Drop the session from the store, returning its final snapshot.
    pub async fn evict(&self, id: SessionId) -> Option<Session> {
        self.store.evict(id).await
    }
}

/// Drive one session to a terminal state. Never returns early without
/// leaving the session on `Completed`, `Failed`, or `Cancelled`.
async fn run_session<S, O>(
    source: Arc<S>,
    oracle: Arc<O>,
    shared_limiter: Option<Arc<RateLimiter>>,
    handle: SessionHandle,
    video: String,
    options: ClipOptions,
) where
    S: TranscriptSource,
    O: ScoringOracle,
{
    let cancel = handle.cancel_token();

    // Stage 1: fetch the transcript.
    if cancel.is_cancelled() {
        return cancelled(&handle).await;
    }
    handle
        .transition(
            SessionState::FetchingTranscript,
            "fetching transcript",
            None,
            None,
        )
        .await;

    let transcript = match fetch_with_retry(source.as_ref(), &video, &options).await {
        Ok(transcript) => transcript,
        Err(err) => return fail(&handle, &err).await,
    };
    let segment_count = transcript.segments().len();
    handle
        .update(|session| session.transcript = Some(transcript.clone()))
        .await;

    // Stage 2: chunk into candidate windows.
    if cancel.is_cancelled() {
        return cancelled(&handle).await;
    }
    handle
        .transition(
            SessionState::Chunking,
            format!("chunking {segment_count} transcript segments"),
            None,
            None,
        )
        .await;

    let candidates: Vec<_> = match chunk(&transcript, &options.chunk_params()) {
        Ok(windows) => windows.collect(),
        Err(err) => return fail(&handle, &err).await,
    };
    if candidates.is_empty() {
        let err = Error::Chunking("no candidate window fits the duration bounds".into());
        return fail(&handle, &err).await;
    }
    handle
        .update(|session| session.candidates = candidates.clone())
        .await;

    // Stage 3: score candidates via the oracle.
    if cancel.is_cancelled() {
        return cancelled(&handle).await;
    }
    handle
        .transition(
            SessionState::Scoring,
            format!("scoring {} candidate windows", candidates.len()),
            Some(PartialResult::Candidates {
                count: candidates.len(),
            }),
            None,
        )
        .await;

    let limiter = shared_limiter
        .unwrap_or_else(|| Arc::new(RateLimiter::new(options.oracle_interval)));
    let scorer = Scorer::new(
        oracle,
        limiter,
        options.weights,
        options.oracle_timeout,
        options.retry,
    );

    let scored = match scorer.score_all(&transcript, &candidates, &cancel).await {
        Ok(scored) => scored,
        Err(Error::Cancelled) => return cancelled(&handle).await,
        Err(err) => return fail(&handle, &err).await,
    };
    let dropped = candidates.len() - scored.len();
    handle
        .update(|session| session.scored_count = scored.len())
        .await;

    // Stage 4: select the final clips.
    if cancel.is_cancelled() {
        return cancelled(&handle).await;
    }
    handle
        .transition(
            SessionState::Selecting,
            format!("selecting clips from {} scored candidates", scored.len()),
            Some(PartialResult::Scored {
                scored: scored.len(),
                dropped,
            }),
            None,
        )
        .await;

    let clips = match select(scored, &options.select_params()) {
        Ok(clips) => clips,
        Err(err) => return fail(&handle, &err).await,
    };
    handle
        .update(|session| session.selected_clips = clips.clone())
        .await;

    info!(clips = clips.len(), "session complete");
    handle
        .transition(
            SessionState::Completed,
            format!("selected {} clips", clips.len()),
            Some(PartialResult::Clips { clips }),
            None,
        )
        .await;
}

/// Fetch the transcript, retrying transient failures under the session's
/// retry policy. Structural failures (no captions) never retry.
async fn fetch_with_retry<S: TranscriptSource>(
    source: &S,
    video: &str,
    options: &ClipOptions,
) -> Result<crate::transcript::Transcript> {
    let mut attempt = 0;
    loop {
        match source.fetch(video, &options.tracks).await {
            Ok(transcript) => return Ok(transcript),
            Err(err) if err.is_transient() && attempt + 1 < options.retry.max_attempts => {
                warn!(attempt, error = %err, "transcript fetch failed, retrying");
                tokio::time::sleep(options.retry.backoff_after(attempt)).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(Error::TranscriptUnavailable {
                    video: video.to_string(),
                    reason: err.message,
                });
            }
        }
    }
}

async fn fail(handle: &SessionHandle, err: &Error) {
    error!(error = %err, "session failed");
    handle
        .transition(
            SessionState::Failed,
            err.to_string(),
            None,
            Some(SessionError::from(err)),
        )
        .await;
}

async fn cancelled(handle: &SessionHandle) {
    info!("session cancelled");
    handle
        .transition(SessionState::Cancelled, "processing cancelled", None, None)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleJudgment, OracleRequest};
    use crate::source::{FetchError, TrackSelection};
    use crate::transcript::Transcript;
    use crate::BoxFuture;

    struct EmptySource;

    impl TranscriptSource for EmptySource {
        fn fetch<'a>(
            &'a self,
            _video: &'a str,
            _tracks: &'a TrackSelection,
        ) -> BoxFuture<'a, std::result::Result<Transcript, FetchError>> {
            Box::pin(async { Err(FetchError::no_captions("nothing here")) })
        }
    }

    struct NullOracle;

    impl ScoringOracle for NullOracle {
        fn evaluate<'a>(
            &'a self,
            _req: OracleRequest<'a>,
        ) -> BoxFuture<'a, Result<OracleJudgment>> {
            Box::pin(async { Err(Error::Scoring("unused".into())) })
        }
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_before_any_work() {
        let pipeline = Pipeline::new(EmptySource, NullOracle, PipelineConfig::default());

        let mut options = ClipOptions::default();
        options.max_clips = 0;

        let err = pipeline.start_session("vid", options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn missing_captions_fail_without_retry() -> anyhow::Result<()> {
        let pipeline = Pipeline::new(EmptySource, NullOracle, PipelineConfig::default());
        let id = pipeline
            .start_session("vid", ClipOptions::default())
            .await?;

        let mut stream = pipeline.subscribe(id).await.expect("subscribed");
        let mut last = None;
        while let Some(event) = stream.next().await {
            last = Some(event);
        }

        let last = last.expect("at least one event");
        assert_eq!(last.state, SessionState::Failed);
        assert_eq!(
            last.error.expect("error recorded").kind,
            crate::ErrorKind::TranscriptUnavailable
        );
        Ok(())
    }
}
