//! Network adapters for the external collaborators.
//!
//! The pipeline consumes its collaborators through traits; these are the
//! thin `reqwest` implementations the binaries inject. They own transport
//! only (prompting and inference live on the other side of the wire), and
//! their response parsing is pure so it can be tested offline.

use serde::Deserialize;

use crate::oracle::{OracleJudgment, OracleRequest, ScoringOracle};
use crate::source::{FetchError, TrackSelection, TranscriptSource};
use crate::transcript::{Transcript, TranscriptSegment, clean_text};
use crate::{BoxFuture, Error, Result};

/// One caption item as caption services commonly ship them:
/// a start offset plus a duration, not an end timestamp.
#[derive(Debug, Deserialize)]
struct CaptionItem {
    start: f64,
    duration: f64,
    text: String,
}

/// Convert a caption-service JSON payload into a [`Transcript`].
pub fn parse_caption_payload(raw: &str) -> std::result::Result<Transcript, FetchError> {
    let items: Vec<CaptionItem> = serde_json::from_str(raw)
        .map_err(|err| FetchError::unreachable(format!("malformed caption payload: {err}")))?;

    // Auto-generated tracks routinely overlap adjacent cues by a fraction of
    // a second; clamp rather than reject, dropping cues swallowed entirely.
    let mut segments: Vec<TranscriptSegment> = Vec::with_capacity(items.len());
    for item in items {
        let mut start = item.start;
        let end = item.start + item.duration;
        if let Some(prev) = segments.last() {
            if start < prev.end_seconds {
                start = prev.end_seconds;
            }
        }
        if end <= start {
            continue;
        }
        segments.push(TranscriptSegment {
            start_seconds: start,
            end_seconds: end,
            text: clean_text(&item.text),
        });
    }

    if segments.is_empty() {
        return Err(FetchError::no_captions("caption track is empty"));
    }

    Transcript::new(segments)
        .map_err(|err| FetchError::no_captions(format!("unusable caption track: {err}")))
}

/// Transcript source backed by an HTTP captions endpoint.
///
/// `GET {base_url}/{video}?languages=a,b&prefer_manual=bool` returning a JSON
/// array of caption items.
pub struct HttpTranscriptSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTranscriptSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }
}

impl TranscriptSource for HttpTranscriptSource {
    fn fetch<'a>(
        &'a self,
        video: &'a str,
        tracks: &'a TrackSelection,
    ) -> BoxFuture<'a, std::result::Result<Transcript, FetchError>> {
        Box::pin(async move {
            let url = format!("{}/{}", self.base_url, video);
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("languages", tracks.languages.join(",")),
                    ("prefer_manual", tracks.prefer_manual.to_string()),
                ])
                .send()
                .await
                .map_err(|err| FetchError::unreachable(format!("caption fetch failed: {err}")))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::no_captions(format!(
                    "no caption track for '{video}'"
                )));
            }
            if !response.status().is_success() {
                return Err(FetchError::unreachable(format!(
                    "caption service answered {}",
                    response.status()
                )));
            }

            let raw = response
                .text()
                .await
                .map_err(|err| FetchError::unreachable(format!("caption read failed: {err}")))?;

            parse_caption_payload(&raw)
        })
    }
}

/// Scoring oracle backed by an HTTP judgment endpoint.
///
/// `POST {url}` with the request as JSON; the response body must parse into
/// an [`OracleJudgment`] (markdown fences tolerated). Every transport or
/// parse failure is a scoring error, which the scorer treats as transient.
pub struct HttpOracle {
    client: reqwest::Client,
    url: String,
}

impl HttpOracle {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl ScoringOracle for HttpOracle {
    fn evaluate<'a>(&'a self, req: OracleRequest<'a>) -> BoxFuture<'a, Result<OracleJudgment>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&req)
                .send()
                .await
                .map_err(|err| Error::Scoring(format!("oracle request failed: {err}")))?;

            if !response.status().is_success() {
                return Err(Error::Scoring(format!(
                    "oracle answered {}",
                    response.status()
                )));
            }

            let raw = response
                .text()
                .await
                .map_err(|err| Error::Scoring(format!("oracle read failed: {err}")))?;

            OracleJudgment::from_json_str(&raw)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchFailure;

    #[test]
    fn caption_payload_parses_start_plus_duration() -> anyhow::Result<()> {
        let raw = r#"[
            {"start": 0.0, "duration": 4.2, "text": "hello"},
            {"start": 4.2, "duration": 3.0, "text": "world"}
        ]"#;
        let transcript = parse_caption_payload(raw).map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(transcript.segments().len(), 2);
        assert_eq!(transcript.segments()[1].end_seconds, 7.2);
        Ok(())
    }

    #[test]
    fn empty_caption_payload_is_no_captions() {
        let err = parse_caption_payload("[]").unwrap_err();
        assert_eq!(err.kind, FetchFailure::NoCaptions);
    }

    #[test]
    fn malformed_caption_payload_is_transient() {
        let err = parse_caption_payload("<html>502</html>").unwrap_err();
        assert_eq!(err.kind, FetchFailure::Unreachable);
    }

    #[test]
    fn overlapping_captions_are_clamped_not_rejected() -> anyhow::Result<()> {
        let raw = r#"[
            {"start": 0.0, "duration": 10.0, "text": "a"},
            {"start": 5.0, "duration": 10.0, "text": "b"},
            {"start": 6.0, "duration": 2.0, "text": "swallowed"}
        ]"#;
        let transcript = parse_caption_payload(raw).map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(transcript.segments().len(), 2);
        assert_eq!(transcript.segments()[1].start_seconds, 10.0);
        assert_eq!(transcript.segments()[1].end_seconds, 15.0);
        Ok(())
    }
}
