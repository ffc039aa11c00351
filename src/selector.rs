//! Greedy clip selection.
//!
//! Candidates are ranked by composite score and accepted greedily: once a
//! candidate is skipped it stays skipped. This trades global optimality for
//! O(n log n + n·k) cost (k = accepted count), which is the intended
//! behavior, not a shortcut.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::score::{Score, ScoredCandidate};
use crate::chunker::CandidateWindow;
use crate::{Error, Result};

/// Parameters bounding the selected subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectParams {
    pub max_clips: usize,
    pub min_gap_seconds: f64,
    /// Jaccard similarity at or above which a candidate is rejected as a
    /// near-duplicate of an accepted clip. `1.0` disables the filter.
    pub similarity_threshold: f64,
}

/// A clip that made the final cut.
///
/// `rank` is 1-based acceptance order: rank 1 carries the highest composite
/// among accepted clips. Within a session, clip time ranges are pairwise
/// disjoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedClip {
    pub window: CandidateWindow,
    pub score: Score,
    pub rank: u32,
}

/// Pick a non-overlapping, diverse, bounded subset of scored candidates.
///
/// Deterministic: candidates are ordered by composite descending with ties
/// broken by earlier start, and the greedy walk never backtracks. Fails with
/// a selection error only when *zero* candidates survive; fewer clips than
/// requested is a successful partial result.
pub fn select(
    mut candidates: Vec<ScoredCandidate>,
    params: &SelectParams,
) -> Result<Vec<SelectedClip>> {
    if candidates.is_empty() {
        return Err(Error::Selection(
            "no scored candidates to select from".into(),
        ));
    }

    candidates.sort_by(|a, b| {
        b.score
            .composite
            .total_cmp(&a.score.composite)
            .then(a.window.start_seconds.total_cmp(&b.window.start_seconds))
    });

    let mut selected: Vec<SelectedClip> = Vec::new();

    for candidate in candidates {
        if selected.len() >= params.max_clips {
            break;
        }
        if !clears_gap(&candidate.window, &selected, params.min_gap_seconds) {
            continue;
        }
        if is_near_duplicate(&candidate.window, &selected, params.similarity_threshold) {
            continue;
        }

        let rank = selected.len() as u32 + 1;
        selected.push(SelectedClip {
            window: candidate.window,
            score: candidate.score,
            rank,
        });
    }

    if selected.is_empty() {
        return Err(Error::Selection(
            "every candidate was filtered out by overlap or similarity constraints".into(),
        ));
    }

    Ok(selected)
}

/// Candidate leaves at least `gap` between its boundaries and every accepted
/// window. Disjointness follows for any non-negative gap.
fn clears_gap(window: &CandidateWindow, selected: &[SelectedClip], gap: f64) -> bool {
    selected.iter().all(|clip| {
        window.start_seconds >= clip.window.end_seconds + gap
            || clip.window.start_seconds >= window.end_seconds + gap
    })
}

fn is_near_duplicate(window: &CandidateWindow, selected: &[SelectedClip], threshold: f64) -> bool {
    if threshold >= 1.0 {
        return false;
    }
    selected
        .iter()
        .any(|clip| jaccard_similarity(&window.text, &clip.window.text) >= threshold)
}

/// Jaccard similarity over lowercased word sets. Cheap, order-insensitive,
/// and good enough to catch overlapping windows that carry the same speech.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    intersection as f64 / union as f64
}
