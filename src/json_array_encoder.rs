use std::io::Write;

use crate::Result;
use crate::clip_encoder::ClipEncoder;
use crate::selector::SelectedClip;

/// A `ClipEncoder` that writes clips as a single JSON array.
///
/// Design:
/// - We stream output directly to a `Write` implementation to avoid buffering
///   all clips in memory.
/// - The encoder is stateful so we can emit a well-formed JSON array incrementally.
///
/// Example output:
/// ```json
/// [
///   { "window": { "start_seconds": 12.0, ... }, "score": { ... }, "rank": 1 }
/// ]
/// ```
pub struct JsonArrayEncoder<W: Write> {
    /// The underlying writer we stream JSON into.
    w: W,

    /// Whether we have written the opening `[` of the JSON array.
    started: bool,

    /// Whether the next element will be the first element in the array.
    /// This lets us correctly place commas between elements.
    first: bool,

    /// Whether the encoder has been closed.
    /// Once closed, no further writes are allowed.
    closed: bool,
}

impl<W: Write> JsonArrayEncoder<W> {
    /// Create a new JSON array encoder that writes to the given writer.
    ///
    /// At creation time:
    /// - We have not written anything yet.
    /// - The JSON array is opened lazily on the first write or on close.
    pub fn new(w: W) -> Self {
        Self {
            w,
            started: false,
            first: true,
            closed: false,
        }
    }

    /// Write the opening `[` of the JSON array if we have not already done so.
    ///
    /// We defer writing the opening bracket so that:
    /// - Empty output still results in valid JSON (`[]`)
    /// - We do not emit partial output unless a clip is actually written
    fn start_if_needed(&mut self) -> Result<()> {
        if !self.started {
            self.w.write_all(b"[")?;
            self.started = true;
        }
        Ok(())
    }
}

impl<W: Write> ClipEncoder for JsonArrayEncoder<W> {
    /// Serialize a single clip and append it to the JSON array.
    fn write_clip(&mut self, clip: &SelectedClip) -> Result<()> {
        if self.closed {
            return Err(crate::Error::Other(
                "cannot write clip: encoder is already closed".into(),
            ));
        }

        // Ensure the JSON array has been started.
        self.start_if_needed()?;

        // Write a comma before every element except the first.
        if !self.first {
            self.w.write_all(b",")?;
        }
        self.first = false;

        // Stream the clip directly into the writer as JSON.
        serde_json::to_writer(&mut self.w, clip)?;

        // Flush so streaming consumers (stdout, pipes, sockets) see output promptly.
        self.w.flush()?;

        Ok(())
    }

    /// Finalize the JSON array and flush the underlying writer.
    ///
    /// This method is idempotent:
    /// - Calling `close()` multiple times is safe.
    /// - After closing, no further clips may be written.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        // Ensure we still output a valid JSON array even if no clips were written.
        self.start_if_needed()?;

        // Close the JSON array.
        self.w.write_all(b"]")?;
        self.w.flush()?;

        self.closed = true;
        Ok(())
    }
}
