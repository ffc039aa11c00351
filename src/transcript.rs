use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One caption cue: a half-open time range and the text spoken inside it.
///
/// Segments are immutable once fetched. The `Transcript` constructor enforces
/// ordering, so any `TranscriptSegment` reachable from a `Transcript` can be
/// trusted to sit after its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// A normalized caption track: ordered, non-overlapping segments plus the
/// total duration of the recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    segments: Vec<TranscriptSegment>,
    duration_seconds: f64,
}

impl Transcript {
    /// Build a transcript from raw segments.
    ///
    /// We validate here rather than trusting the source: caption feeds in the wild
    /// produce zero-length cues, out-of-order cues, and overlapping cues, and every
    /// downstream component assumes none of those exist.
    pub fn new(segments: Vec<TranscriptSegment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::Chunking("transcript has no segments".into()));
        }

        let mut prev_start = f64::NEG_INFINITY;
        let mut prev_end = 0.0_f64;
        for (idx, seg) in segments.iter().enumerate() {
            if !seg.start_seconds.is_finite() || !seg.end_seconds.is_finite() {
                return Err(Error::Chunking(format!(
                    "segment {idx} has a non-finite timestamp"
                )));
            }
            if seg.end_seconds <= seg.start_seconds {
                return Err(Error::Chunking(format!(
                    "segment {idx} is empty or reversed ({:.3}s..{:.3}s)",
                    seg.start_seconds, seg.end_seconds
                )));
            }
            if seg.start_seconds <= prev_start || seg.start_seconds < prev_end {
                return Err(Error::Chunking(format!(
                    "segment {idx} overlaps or precedes its predecessor"
                )));
            }
            prev_start = seg.start_seconds;
            prev_end = seg.end_seconds;
        }

        let duration_seconds = segments
            .last()
            .map(|seg| seg.end_seconds)
            .unwrap_or_default();

        Ok(Self {
            segments,
            duration_seconds,
        })
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Indices of all segments overlapping the half-open range `[start, end)`.
    pub fn segments_between(&self, start_seconds: f64, end_seconds: f64) -> std::ops::Range<usize> {
        let lo = self
            .segments
            .partition_point(|seg| seg.end_seconds <= start_seconds);
        let hi = self
            .segments
            .partition_point(|seg| seg.start_seconds < end_seconds);
        lo..hi.max(lo)
    }

    /// The joined text of all segments overlapping `[start, end)`.
    pub fn text_between(&self, start_seconds: f64, end_seconds: f64) -> String {
        let range = self.segments_between(start_seconds, end_seconds);
        join_segment_text(&self.segments[range])
    }
}

/// Join segment texts with single spaces, skipping blanks.
pub(crate) fn join_segment_text(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for seg in segments {
        let trimmed = seg.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }
    out
}

/// Normalize caption text: strip music notation and leading speaker labels,
/// collapse runs of whitespace.
///
/// Caption feeds embed `♪ lyrics ♪` markers and `SPEAKER NAME:` prefixes that
/// add nothing for engagement judging and waste oracle context.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        let mut rest = line;

        // Leading `ALL CAPS NAME:` speaker labels.
        if let Some(colon) = rest.find(':') {
            let label = &rest[..colon];
            if !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_whitespace())
            {
                rest = &rest[colon + 1..];
            }
        }

        let mut in_music = false;
        for c in rest.chars() {
            match c {
                '♪' => in_music = !in_music,
                _ if in_music => {}
                c if c.is_whitespace() => {
                    if !out.ends_with(' ') && !out.is_empty() {
                        out.push(' ');
                    }
                }
                c => out.push(c),
            }
        }
        if !out.ends_with(' ') && !out.is_empty() {
            out.push(' ');
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start_seconds: start,
            end_seconds: end,
            text: text.to_string(),
        }
    }

    #[test]
    fn new_accepts_ordered_segments() -> anyhow::Result<()> {
        let t = Transcript::new(vec![seg(0.0, 5.0, "a"), seg(5.0, 10.0, "b")])?;
        assert_eq!(t.duration_seconds(), 10.0);
        assert_eq!(t.segments().len(), 2);
        Ok(())
    }

    #[test]
    fn new_rejects_empty_overlapping_and_reversed() {
        assert!(Transcript::new(vec![]).is_err());
        assert!(Transcript::new(vec![seg(0.0, 0.0, "empty")]).is_err());
        assert!(Transcript::new(vec![seg(0.0, 6.0, "a"), seg(5.0, 10.0, "b")]).is_err());
        assert!(Transcript::new(vec![seg(5.0, 10.0, "b"), seg(0.0, 5.0, "a")]).is_err());
    }

    #[test]
    fn segments_between_uses_half_open_overlap() -> anyhow::Result<()> {
        let t = Transcript::new(vec![
            seg(0.0, 5.0, "a"),
            seg(5.0, 10.0, "b"),
            seg(10.0, 15.0, "c"),
        ])?;

        assert_eq!(t.segments_between(0.0, 5.0), 0..1);
        assert_eq!(t.segments_between(4.9, 10.1), 0..3);
        assert_eq!(t.segments_between(5.0, 10.0), 1..2);
        assert_eq!(t.segments_between(20.0, 30.0), 3..3);
        Ok(())
    }

    #[test]
    fn text_between_joins_overlapping_segments() -> anyhow::Result<()> {
        let t = Transcript::new(vec![seg(0.0, 5.0, "hello"), seg(5.0, 10.0, "world")])?;
        assert_eq!(t.text_between(0.0, 10.0), "hello world");
        assert_eq!(t.text_between(6.0, 7.0), "world");
        Ok(())
    }

    #[test]
    fn clean_text_strips_music_and_speaker_labels() {
        assert_eq!(clean_text("♪ la la la ♪ we are back"), "we are back");
        assert_eq!(clean_text("HOST: welcome   to the show"), "welcome to the show");
        assert_eq!(clean_text("one\ntwo\n three"), "one two three");
    }
}
