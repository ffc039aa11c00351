use anyhow::{Context, Result, bail};
use clap::Parser;

use std::io::{self, BufWriter};

use whittle::clip_encoder::ClipEncoder;
use whittle::heuristic::HeuristicOracle;
use whittle::json_array_encoder::JsonArrayEncoder;
use whittle::oracle::{OracleJudgment, OracleRequest, ScoringOracle};
use whittle::output_type::OutputType;
use whittle::remote::{HttpOracle, parse_caption_payload};
use whittle::source::{FetchError, TrackSelection, TranscriptSource};
use whittle::text_encoder::TextEncoder;
use whittle::{
    BoxFuture, ClipOptions, Pipeline, PipelineConfig, SelectedClip, SessionState, Transcript,
};

#[derive(Parser, Debug)]
#[command(name = "whittle")]
#[command(about = "Select high-engagement clips from a transcript")]
struct Params {
    /// Path to a captions JSON file (array of {start, duration, text}).
    #[arg(short = 't', long = "transcript")]
    pub transcript_path: String,

    /// Judgment endpoint URL; omit to use the offline heuristic judge.
    #[arg(long = "oracle-url")]
    pub oracle_url: Option<String>,

    /// Score with the built-in deterministic heuristic instead of an oracle.
    #[arg(long = "offline", default_value_t = false)]
    pub offline: bool,

    #[arg(
        short = 'o',
        long = "output-type",
        value_enum,
        default_value_t = OutputType::Text
    )]
    pub output_type: OutputType,

    #[arg(long = "max-clips", default_value_t = 3)]
    pub max_clips: usize,

    #[arg(long = "min-duration", default_value_t = 15.0)]
    pub min_duration_seconds: f64,

    #[arg(long = "max-duration", default_value_t = 60.0)]
    pub max_duration_seconds: f64,

    #[arg(long = "stride", default_value_t = 30.0)]
    pub stride_seconds: f64,

    #[arg(long = "min-gap", default_value_t = 5.0)]
    pub min_gap_seconds: f64,

    /// Minimum spacing between oracle requests, in seconds.
    #[arg(long = "oracle-interval", default_value_t = 1.0)]
    pub oracle_interval_seconds: f64,
}

/// The CLI's judge: a remote oracle when a URL is given, otherwise the
/// offline heuristic. An enum keeps the pipeline monomorphic without
/// trait objects in the binary.
enum CliOracle {
    Http(HttpOracle),
    Heuristic(HeuristicOracle),
}

impl ScoringOracle for CliOracle {
    fn evaluate<'a>(
        &'a self,
        req: OracleRequest<'a>,
    ) -> BoxFuture<'a, whittle::Result<OracleJudgment>> {
        match self {
            CliOracle::Http(oracle) => oracle.evaluate(req),
            CliOracle::Heuristic(oracle) => oracle.evaluate(req),
        }
    }
}

/// Serves the already-parsed transcript file to the pipeline.
struct FileSource {
    transcript: Transcript,
}

impl TranscriptSource for FileSource {
    fn fetch<'a>(
        &'a self,
        _video: &'a str,
        _tracks: &'a TrackSelection,
    ) -> BoxFuture<'a, std::result::Result<Transcript, FetchError>> {
        let transcript = self.transcript.clone();
        Box::pin(async move { Ok(transcript) })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    whittle::logging::init();
    let params = Params::parse();

    let oracle = match (&params.oracle_url, params.offline) {
        (Some(url), false) => CliOracle::Http(HttpOracle::new(reqwest::Client::new(), url)),
        (None, true) => CliOracle::Heuristic(HeuristicOracle::new()),
        (Some(_), true) => bail!("--oracle-url and --offline are mutually exclusive"),
        (None, false) => bail!("pass --oracle-url or --offline to choose a judge"),
    };

    let raw = std::fs::read_to_string(&params.transcript_path)
        .with_context(|| format!("failed to read '{}'", params.transcript_path))?;
    let transcript = parse_caption_payload(&raw)
        .with_context(|| format!("failed to parse '{}'", params.transcript_path))?;

    let options = ClipOptions {
        max_clips: params.max_clips,
        min_duration_seconds: params.min_duration_seconds,
        max_duration_seconds: params.max_duration_seconds,
        stride_seconds: params.stride_seconds,
        min_gap_seconds: params.min_gap_seconds,
        oracle_interval: std::time::Duration::from_secs_f64(params.oracle_interval_seconds),
        ..ClipOptions::default()
    };

    let pipeline = Pipeline::new(
        FileSource { transcript },
        oracle,
        PipelineConfig::default(),
    );

    let session_id = pipeline
        .start_session(&params.transcript_path, options)
        .await?;

    let mut events = pipeline
        .subscribe(session_id)
        .await
        .context("session vanished before subscribing")?;

    let clips = loop {
        let Some(event) = events.next().await else {
            bail!("progress stream ended before a terminal state");
        };
        eprintln!("[{}] {}", state_label(event.state), event.message);

        match event.state {
            SessionState::Completed => {
                let session = pipeline
                    .get_session(session_id)
                    .await
                    .context("completed session missing from store")?;
                break session.selected_clips;
            }
            SessionState::Failed => bail!("processing failed: {}", event.message),
            SessionState::Cancelled => bail!("processing was cancelled"),
            _ => {}
        }
    };

    write_clips(&clips, &params.output_type)
}

fn write_clips(clips: &[SelectedClip], output_type: &OutputType) -> Result<()> {
    let stdout = io::stdout();
    let writer = BufWriter::new(stdout.lock());

    let mut encoder: Box<dyn ClipEncoder> = match output_type {
        OutputType::Json => Box::new(JsonArrayEncoder::new(writer)),
        OutputType::Text => Box::new(TextEncoder::new(writer)),
    };

    for clip in clips {
        encoder.write_clip(clip)?;
    }
    encoder.close()?;
    Ok(())
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Created => "created",
        SessionState::FetchingTranscript => "fetching",
        SessionState::Chunking => "chunking",
        SessionState::Scoring => "scoring",
        SessionState::Selecting => "selecting",
        SessionState::Completed => "completed",
        SessionState::Failed => "failed",
        SessionState::Cancelled => "cancelled",
    }
}
