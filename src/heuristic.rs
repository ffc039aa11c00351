//! Offline engagement judge.
//!
//! A deterministic, lexical stand-in for the real scoring oracle: dry runs
//! and the CLI's offline mode need *some* judge, and a cheap signal-weighted
//! one is enough to exercise the whole pipeline without network access or
//! quota. Scores are crude by design; this is not a substitute for a real
//! oracle in production.

use crate::oracle::{OracleJudgment, OracleRequest, ScoringOracle};
use crate::{BoxFuture, Result};

const HOOK_OPENERS: &[&str] = &[
    "why", "how", "what", "never", "stop", "imagine", "here's", "nobody",
];

const VALUE_MARKERS: &[&str] = &[
    "should", "step", "tip", "means", "because", "learn", "instead", "actually", "rule",
];

const EMOTION_MARKERS: &[&str] = &[
    "amazing", "incredible", "insane", "crazy", "love", "hate", "unbelievable", "wow", "terrified",
    "shocked",
];

const WEAK_OPENERS: &[&str] = &["and", "but", "so", "this", "that", "it", "he", "she", "they"];

/// Deterministic lexical oracle. Same text in, same judgment out.
#[derive(Debug, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn new() -> Self {
        Self
    }

    fn judge(text: &str) -> OracleJudgment {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        let word_count = words.len().max(1);

        let opening = &words[..words.len().min(12)];

        let mut hook: f64 = 0.2;
        if opening.iter().any(|w| HOOK_OPENERS.contains(w)) {
            hook += 0.35;
        }
        if lower.contains('?') {
            hook += 0.2;
        }
        if words.iter().any(|w| w.chars().all(|c| c.is_ascii_digit())) {
            hook += 0.15;
        }

        let value_hits = words.iter().filter(|w| VALUE_MARKERS.contains(*w)).count();
        let value = 0.2 + (value_hits as f64 / word_count as f64) * 8.0;

        let mut standalone: f64 = 0.8;
        if opening.first().is_some_and(|w| WEAK_OPENERS.contains(w)) {
            standalone -= 0.4;
        }
        if word_count < 20 {
            standalone -= 0.2;
        }

        let emotion_hits = words
            .iter()
            .filter(|w| EMOTION_MARKERS.contains(*w))
            .count();
        let emotional = 0.1 + (emotion_hits as f64 / word_count as f64) * 10.0 + exclaim(text);

        OracleJudgment {
            hook: hook.clamp(0.0, 1.0),
            value: value.clamp(0.0, 1.0),
            standalone: standalone.clamp(0.0, 1.0),
            emotional: emotional.clamp(0.0, 1.0),
            reasoning: "lexical heuristic (offline judge)".to_string(),
        }
    }
}

fn exclaim(text: &str) -> f64 {
    if text.contains('!') { 0.15 } else { 0.0 }
}

impl ScoringOracle for HeuristicOracle {
    fn evaluate<'a>(&'a self, req: OracleRequest<'a>) -> BoxFuture<'a, Result<OracleJudgment>> {
        let judgment = Self::judge(req.candidate_text);
        Box::pin(async move { Ok(judgment) })
    }
}
