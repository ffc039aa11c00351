use std::io::Write;

use crate::Result;
use crate::clip_encoder::ClipEncoder;
use crate::selector::SelectedClip;

/// A `ClipEncoder` that writes clips as a human-readable list.
///
/// Design:
/// - We stream output directly to a `Write` implementation.
/// - One block per clip: a timing/score line, then the clip text, then the
///   oracle's reasoning when present.
pub struct TextEncoder<W: Write> {
    /// The underlying writer.
    w: W,

    /// Whether the encoder has been closed.
    closed: bool,
}

impl<W: Write> TextEncoder<W> {
    /// Create a new text encoder that writes to the provided writer.
    pub fn new(w: W) -> Self {
        Self { w, closed: false }
    }
}

impl<W: Write> ClipEncoder for TextEncoder<W> {
    fn write_clip(&mut self, clip: &SelectedClip) -> Result<()> {
        if self.closed {
            return Err(crate::Error::Other(
                "cannot write clip: encoder is already closed".into(),
            ));
        }

        writeln!(
            &mut self.w,
            "#{} {} --> {}  (composite {:.2})",
            clip.rank,
            format_timestamp(clip.window.start_seconds),
            format_timestamp(clip.window.end_seconds),
            clip.score.composite,
        )?;
        writeln!(&mut self.w, "{}", clip.window.text)?;
        if !clip.score.reasoning.is_empty() {
            writeln!(&mut self.w, "  reasoning: {}", clip.score.reasoning)?;
        }
        writeln!(&mut self.w)?;

        // Flush so streaming consumers (stdout, pipes) see output promptly.
        self.w.flush()?;

        Ok(())
    }

    /// Flush the underlying writer. This is idempotent.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.w.flush()?;
        self.closed = true;

        Ok(())
    }
}

/// Format seconds as `HH:MM:SS.mmm`.
///
/// Rounding policy:
/// - We round to the nearest millisecond to reduce drift when converting from `f64`.
fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;

    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;

    let s = total_s % 60;
    let total_m = total_s / 60;

    let m = total_m % 60;
    let h = total_m / 60;

    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::CandidateWindow;
    use crate::score::{Score, ScoreWeights};

    fn clip(start: f64, end: f64, text: &str, rank: u32) -> SelectedClip {
        SelectedClip {
            window: CandidateWindow {
                start_seconds: start,
                end_seconds: end,
                text: text.to_string(),
                source_segments: 0..1,
            },
            score: Score::new(1.0, 1.0, 1.0, 1.0, "strong open", &ScoreWeights::default()),
            rank,
        }
    }

    #[test]
    fn text_close_without_clips_emits_nothing() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = TextEncoder::new(&mut out);
        enc.close()?;
        assert_eq!(std::str::from_utf8(&out)?, "");
        Ok(())
    }

    #[test]
    fn text_blocks_carry_rank_timing_and_reasoning() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = TextEncoder::new(&mut out);

        enc.write_clip(&clip(61.2, 82.0, "hello world", 1))?;
        enc.close()?;

        let s = std::str::from_utf8(&out)?;
        assert!(s.contains("#1 00:01:01.200 --> 00:01:22.000"));
        assert!(s.contains("hello world"));
        assert!(s.contains("reasoning: strong open"));
        Ok(())
    }

    #[test]
    fn text_format_timestamp_rounds_to_nearest_millisecond() {
        assert_eq!(format_timestamp(0.0004), "00:00:00.000");
        assert_eq!(format_timestamp(0.0005), "00:00:00.001");
        assert_eq!(format_timestamp(1.9995), "00:00:02.000");
    }

    #[test]
    fn text_write_after_close_errors() -> anyhow::Result<()> {
        let mut out = Vec::new();
        let mut enc = TextEncoder::new(&mut out);
        enc.close()?;
        let err = enc.write_clip(&clip(0.0, 20.0, "nope", 1)).unwrap_err();
        assert!(err.to_string().contains("already closed"));
        Ok(())
    }
}
