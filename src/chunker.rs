//! Sliding-window candidate generation.
//!
//! The chunker deliberately over-generates: windows overlap (stride < window
//! length) so the scorer and selector, not the chunker, decide final clip
//! boundaries. It is a pure function of the transcript and parameters, and
//! the returned iterator is `Clone` so it can be re-consumed.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::transcript::{Transcript, join_segment_text};
use crate::{Error, Result};

/// Parameters bounding candidate windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkParams {
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
    pub stride_seconds: f64,
}

/// A tentative clip time range, snapped to whole transcript segments.
///
/// Derived from a transcript, never mutated after creation.
/// Invariant: `min_duration <= end - start <= max_duration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateWindow {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
    /// Indices into the source transcript's segment list.
    pub source_segments: Range<usize>,
}

impl CandidateWindow {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Whether two windows share any part of their time range.
    pub fn overlaps(&self, other: &CandidateWindow) -> bool {
        self.start_seconds < other.end_seconds && other.start_seconds < self.end_seconds
    }
}

/// Slice a transcript into overlapping candidate windows.
///
/// Nominal window starts advance by `stride`; each start snaps down to the
/// start of its enclosing segment and the window then extends over whole
/// segments for as long as it stays within `max_duration`. A window never
/// cuts a segment mid-text, and the duration invariant always wins over
/// extending to a segment boundary: a single segment longer than
/// `max_duration` can never appear in any window.
///
/// Fails with a chunking error when the transcript cannot yield any window
/// (total duration below `min_duration`) or the parameters are incoherent.
pub fn chunk<'a>(transcript: &'a Transcript, params: &ChunkParams) -> Result<Windows<'a>> {
    validate_params(params)?;

    if transcript.duration_seconds() < params.min_duration_seconds {
        return Err(Error::Chunking(format!(
            "transcript is {:.1}s long, below the {:.1}s minimum clip duration",
            transcript.duration_seconds(),
            params.min_duration_seconds
        )));
    }

    Ok(Windows {
        transcript,
        params: *params,
        next_start: 0.0,
        last_emitted: None,
    })
}

fn validate_params(params: &ChunkParams) -> Result<()> {
    let ChunkParams {
        min_duration_seconds: min,
        max_duration_seconds: max,
        stride_seconds: stride,
    } = *params;

    if !(min.is_finite() && max.is_finite() && stride.is_finite()) {
        return Err(Error::Chunking("chunk parameters must be finite".into()));
    }
    if min <= 0.0 || max <= 0.0 || stride <= 0.0 {
        return Err(Error::Chunking("chunk parameters must be positive".into()));
    }
    if min > max {
        return Err(Error::Chunking(format!(
            "min duration {min:.1}s exceeds max duration {max:.1}s"
        )));
    }
    if stride >= max {
        return Err(Error::Chunking(format!(
            "stride {stride:.1}s must be shorter than the max duration {max:.1}s"
        )));
    }
    Ok(())
}

/// Lazy, finite, re-consumable sequence of [`CandidateWindow`]s.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    transcript: &'a Transcript,
    params: ChunkParams,
    next_start: f64,
    /// Segment range of the last emitted window. Adjacent strides can snap to
    /// the same run of segments; we emit that window once.
    last_emitted: Option<Range<usize>>,
}

impl<'a> Windows<'a> {
    /// Build the window anchored at the segment enclosing (or following)
    /// `nominal_start`, or `None` when no valid window exists there.
    fn window_at(&self, nominal_start: f64) -> Option<(Range<usize>, f64, f64)> {
        let segments = self.transcript.segments();

        let first = segments.partition_point(|seg| seg.end_seconds <= nominal_start);
        if first >= segments.len() {
            return None;
        }

        let start = segments[first].start_seconds;

        let mut last = first;
        while last < segments.len()
            && segments[last].end_seconds - start <= self.params.max_duration_seconds
        {
            last += 1;
        }
        if last == first {
            // The anchoring segment alone exceeds max_duration.
            return None;
        }

        let end = segments[last - 1].end_seconds;
        if end - start < self.params.min_duration_seconds {
            return None;
        }

        Some((first..last, start, end))
    }
}

impl<'a> Iterator for Windows<'a> {
    type Item = CandidateWindow;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_start < self.transcript.duration_seconds() {
            let nominal = self.next_start;
            self.next_start += self.params.stride_seconds;

            let Some((range, start, end)) = self.window_at(nominal) else {
                continue;
            };
            if self.last_emitted.as_ref() == Some(&range) {
                continue;
            }

            let text = join_segment_text(&self.transcript.segments()[range.clone()]);
            self.last_emitted = Some(range.clone());

            return Some(CandidateWindow {
                start_seconds: start,
                end_seconds: end,
                text,
                source_segments: range,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptSegment;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
        }
    }

    fn even_transcript(total_seconds: u32, cue_seconds: u32) -> Transcript {
        let mut segments = Vec::new();
        let mut t = 0;
        while t < total_seconds {
            let end = (t + cue_seconds).min(total_seconds);
            segments.push(seg(t as f64, end as f64, &format!("cue {t}")));
            t = end;
        }
        Transcript::new(segments).expect("valid transcript")
    }

    fn params(min: f64, max: f64, stride: f64) -> ChunkParams {
        ChunkParams {
            min_duration_seconds: min,
            max_duration_seconds: max,
            stride_seconds: stride,
        }
    }

    #[test]
    fn rejects_transcript_shorter_than_min_duration() {
        let t = even_transcript(8, 2);
        let err = chunk(&t, &params(10.0, 20.0, 10.0)).err().expect("error");
        assert!(err.to_string().contains("below"));
    }

    #[test]
    fn rejects_incoherent_params() {
        let t = even_transcript(60, 5);
        assert!(chunk(&t, &params(20.0, 10.0, 5.0)).is_err());
        assert!(chunk(&t, &params(10.0, 20.0, 20.0)).is_err());
        assert!(chunk(&t, &params(10.0, 20.0, -1.0)).is_err());
    }

    #[test]
    fn forty_second_transcript_coverage() -> anyhow::Result<()> {
        // 40s of 5s cues, min 10 / max 20 / stride 10.
        let t = even_transcript(40, 5);
        let windows: Vec<_> = chunk(&t, &params(10.0, 20.0, 10.0))?.collect();

        let ranges: Vec<(f64, f64)> = windows
            .iter()
            .map(|w| (w.start_seconds, w.end_seconds))
            .collect();
        assert_eq!(
            ranges,
            vec![(0.0, 20.0), (10.0, 30.0), (20.0, 40.0), (30.0, 40.0)]
        );

        // The 10s tail exactly fits; nothing shorter than min survives.
        for w in &windows {
            assert!(w.duration_seconds() >= 10.0);
            assert!(w.duration_seconds() <= 20.0);
        }
        Ok(())
    }

    #[test]
    fn duration_bounds_hold_for_uneven_cues() -> anyhow::Result<()> {
        let t = Transcript::new(vec![
            seg(0.0, 7.0, "a"),
            seg(7.0, 9.5, "b"),
            seg(9.5, 21.0, "c"),
            seg(21.5, 33.0, "d"),
            seg(33.0, 44.0, "e"),
        ])?;
        let p = params(8.0, 25.0, 6.0);

        for w in chunk(&t, &p)? {
            assert!(w.duration_seconds() >= p.min_duration_seconds, "{w:?}");
            assert!(w.duration_seconds() <= p.max_duration_seconds, "{w:?}");
            assert!(!w.text.is_empty());
        }
        Ok(())
    }

    #[test]
    fn windows_snap_to_whole_segments() -> anyhow::Result<()> {
        let t = Transcript::new(vec![
            seg(0.0, 8.0, "one"),
            seg(8.0, 16.0, "two"),
            seg(16.0, 24.0, "three"),
        ])?;
        let windows: Vec<_> = chunk(&t, &params(10.0, 20.0, 10.0))?.collect();

        for w in &windows {
            let first = &t.segments()[w.source_segments.start];
            let last = &t.segments()[w.source_segments.end - 1];
            assert_eq!(w.start_seconds, first.start_seconds);
            assert_eq!(w.end_seconds, last.end_seconds);
        }
        Ok(())
    }

    #[test]
    fn oversized_segment_yields_no_window_at_that_position() -> anyhow::Result<()> {
        // The middle cue is 30s long with max at 20s; only its neighbors chunk.
        let t = Transcript::new(vec![
            seg(0.0, 15.0, "ok"),
            seg(15.0, 45.0, "monologue"),
            seg(45.0, 60.0, "ok again"),
        ])?;
        let windows: Vec<_> = chunk(&t, &params(10.0, 20.0, 5.0))?.collect();

        assert!(!windows.is_empty());
        for w in &windows {
            assert!(!w.text.contains("monologue"));
        }
        Ok(())
    }

    #[test]
    fn windows_are_deterministic_and_reconsumable() -> anyhow::Result<()> {
        let t = even_transcript(60, 5);
        let ws = chunk(&t, &params(10.0, 20.0, 10.0))?;

        let a: Vec<_> = ws.clone().map(|w| w.source_segments).collect();
        let b: Vec<_> = ws.map(|w| w.source_segments).collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        Ok(())
    }

    #[test]
    fn adjacent_strides_do_not_duplicate_windows() -> anyhow::Result<()> {
        // 2s stride over 10s cues: many strides land in the same segment run.
        let t = even_transcript(40, 10);
        let windows: Vec<_> = chunk(&t, &params(10.0, 20.0, 2.0))?.collect();

        let mut seen = std::collections::HashSet::new();
        for w in &windows {
            assert!(
                seen.insert((w.source_segments.start, w.source_segments.end)),
                "duplicate window {:?}",
                w.source_segments
            );
        }
        Ok(())
    }
}
