use serde::{Deserialize, Serialize};

use crate::chunker::CandidateWindow;

/// Relative weight of each engagement axis in the composite score.
///
/// Weights are configuration, not constants: different channels value hooks
/// vs depth differently. The composite normalizes by the weight sum, so a
/// non-1.0 sum still yields a composite in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub hook: f64,
    pub value: f64,
    pub standalone: f64,
    pub emotional: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            hook: 0.35,
            value: 0.25,
            standalone: 0.20,
            emotional: 0.20,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.hook + self.value + self.standalone + self.emotional
    }
}

/// Engagement judgment for one candidate window.
///
/// The four axes come from the scoring oracle, each in `[0, 1]`. `composite`
/// is derived once at construction: a pure function of the axes and the
/// configured weights, with no hidden state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub hook: f64,
    pub value: f64,
    pub standalone: f64,
    pub emotional: f64,
    pub composite: f64,
    pub reasoning: String,
}

impl Score {
    pub fn new(
        hook: f64,
        value: f64,
        standalone: f64,
        emotional: f64,
        reasoning: impl Into<String>,
        weights: &ScoreWeights,
    ) -> Self {
        Self {
            hook,
            value,
            standalone,
            emotional,
            composite: composite(hook, value, standalone, emotional, weights),
            reasoning: reasoning.into(),
        }
    }
}

/// The weighted combination of the four axes that ranks candidates.
pub fn composite(
    hook: f64,
    value: f64,
    standalone: f64,
    emotional: f64,
    weights: &ScoreWeights,
) -> f64 {
    let sum = weights.sum();
    if sum <= 0.0 {
        return 0.0;
    }
    (hook * weights.hook
        + value * weights.value
        + standalone * weights.standalone
        + emotional * weights.emotional)
        / sum
}

/// A candidate window together with its engagement score.
///
/// Produced exactly once per surviving candidate; candidates whose scoring
/// permanently fails are dropped, never retained with a null score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub window: CandidateWindow,
    pub score: Score,
}
