//! `whittle` — a small, focused clip-selection pipeline for long-form
//! spoken-word recordings.
//!
//! This crate provides:
//! - A normalized transcript model
//! - Sliding-window candidate generation (chunking)
//! - Rate-limited, retrying engagement scoring via an injected oracle
//! - Greedy, diversity-aware clip selection
//! - A per-session state machine with cancellation and ordered progress events
//!
//! The library is designed to be used by both CLI tools and long-running services,
//! with an emphasis on deterministic behavior, explicit collaborators, and
//! minimal surprises. Fetching captions and judging engagement are external
//! concerns consumed through one-method traits.

use std::future::Future;
use std::pin::Pin;

// High-level API (most consumers should start here).
pub mod options;
pub mod pipeline;

// Core data model.
pub mod transcript;
pub mod score;
pub mod session;

// Pipeline stages.
pub mod chunker;
pub mod scorer;
pub mod selector;

// External collaborator seams and their helpers.
pub mod source;
pub mod oracle;
pub mod heuristic;
pub mod rate_limit;

// Session storage and progress delivery.
pub mod store;
pub mod progress;

// Output selection and encoder interfaces.
pub mod output_type;
pub mod clip_encoder;

// Output encoders that serialize selected clips into various formats.
pub mod json_array_encoder;
pub mod text_encoder;

// Network adapters for the collaborators (feature-gated).
#[cfg(feature = "remote")]
pub mod remote;

// Logging configuration and control (feature-gated).
#[cfg(feature = "logging")]
pub mod logging;

mod error;

pub use crate::chunker::{CandidateWindow, ChunkParams, chunk};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::options::{ClipOptions, RetryPolicy};
pub use crate::oracle::{OracleJudgment, OracleRequest, ScoringOracle};
pub use crate::output_type::OutputType;
pub use crate::pipeline::{Pipeline, PipelineConfig};
pub use crate::progress::{PartialResult, ProgressEvent, ProgressStream};
pub use crate::rate_limit::RateLimiter;
pub use crate::score::{Score, ScoreWeights, ScoredCandidate};
pub use crate::selector::{SelectParams, SelectedClip, select};
pub use crate::session::{Session, SessionId, SessionState};
pub use crate::source::{FetchError, TrackSelection, TranscriptSource};
pub use crate::store::SessionStore;
pub use crate::transcript::{Transcript, TranscriptSegment};

/// Boxed future used by the collaborator traits so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
