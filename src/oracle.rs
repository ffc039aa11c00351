//! The scoring oracle capability.
//!
//! The oracle is the external judge (an LLM in production) that rates a
//! candidate's engagement axes. This crate never builds prompts or calls
//! inference itself; it consumes the oracle through a one-method trait so
//! tests inject deterministic stubs and binaries inject a network adapter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{BoxFuture, Error, Result};

/// One scoring request: the candidate text plus its surrounding transcript
/// context, so the judge can assess how well the clip stands alone.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest<'a> {
    pub candidate_text: &'a str,
    pub context_before: &'a str,
    pub context_after: &'a str,
}

/// The oracle's structured response: four engagement axes plus free-text
/// reasoning.
///
/// Axis ranges are validated by the scorer, not here, so a malformed judgment
/// is observable (and retryable) rather than silently clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleJudgment {
    pub hook: f64,
    pub value: f64,
    pub standalone: f64,
    pub emotional: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl OracleJudgment {
    /// Parse a judgment from raw oracle output.
    ///
    /// LLM responses routinely wrap JSON in markdown code fences or chatty
    /// framing; we strip fences and fall back to the outermost `{...}` span
    /// before giving up. A response that still fails to parse is a scoring
    /// failure for the caller's retry policy to handle.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let candidate = extract_json_object(raw);
        serde_json::from_str(candidate)
            .map_err(|err| Error::Scoring(format!("unparseable oracle response: {err}")))
    }

    /// Whether every axis sits inside `[0, 1]`.
    pub fn axes_in_range(&self) -> bool {
        [self.hook, self.value, self.standalone, self.emotional]
            .iter()
            .all(|axis| axis.is_finite() && (0.0..=1.0).contains(axis))
    }
}

/// Strip markdown code fences and isolate the outermost JSON object.
fn extract_json_object(raw: &str) -> &str {
    let mut text = raw.trim();

    for fence in ["```json", "```"] {
        if let Some(open) = text.find(fence) {
            let after = &text[open + fence.len()..];
            let close = after.find("```").unwrap_or(after.len());
            text = after[..close].trim();
            break;
        }
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if close > open => &text[open..=close],
        _ => text,
    }
}

/// External judge for candidate engagement.
///
/// One method, boxed future: object-safe, injectable, and mockable. The
/// implementation owns its transport, prompting, and parsing; it returns a
/// structured judgment or an error the scorer treats as transient.
pub trait ScoringOracle: Send + Sync {
    fn evaluate<'a>(&'a self, req: OracleRequest<'a>) -> BoxFuture<'a, Result<OracleJudgment>>;
}

/// Deterministic oracle for tests: returns pre-scripted judgments keyed by
/// candidate text, with an optional fallback for everything else.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    by_text: HashMap<String, OracleJudgment>,
    fallback: Option<OracleJudgment>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a judgment for candidates whose text equals `text`.
    pub fn with(mut self, text: impl Into<String>, judgment: OracleJudgment) -> Self {
        self.by_text.insert(text.into(), judgment);
        self
    }

    /// Judgment returned for any candidate without a scripted entry.
    pub fn with_fallback(mut self, judgment: OracleJudgment) -> Self {
        self.fallback = Some(judgment);
        self
    }
}

impl ScoringOracle for ScriptedOracle {
    fn evaluate<'a>(&'a self, req: OracleRequest<'a>) -> BoxFuture<'a, Result<OracleJudgment>> {
        let result = self
            .by_text
            .get(req.candidate_text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Error::Scoring("no scripted judgment for candidate".into()));
        Box::pin(async move { result })
    }
}

/// Oracle that fails every call. Exercises retry and stage-failure paths.
#[derive(Debug, Default)]
pub struct FailingOracle;

impl ScoringOracle for FailingOracle {
    fn evaluate<'a>(&'a self, _req: OracleRequest<'a>) -> BoxFuture<'a, Result<OracleJudgment>> {
        Box::pin(async { Err(Error::Scoring("oracle unavailable".into())) })
    }
}
