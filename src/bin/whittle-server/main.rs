use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use clap::Parser;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, warn};

mod metrics;

use whittle::remote::{HttpOracle, HttpTranscriptSource};
use whittle::{ClipOptions, Pipeline, PipelineConfig, RateLimiter, SessionId};

#[derive(Parser, Debug)]
#[command(name = "whittle-server")]
#[command(about = "HTTP server for transcript clip selection")]
struct Params {
    /// Base URL of the captions service (`GET {url}/{video}`).
    #[arg(short = 'c', long = "captions-url", required = true)]
    captions_url: String,

    /// URL of the scoring-oracle judgment endpoint.
    #[arg(short = 'j', long = "oracle-url", required = true)]
    oracle_url: String,

    /// Host interface to bind to.
    #[arg(long = "host", default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", default_value_t = 8080)]
    port: u16,

    /// Sessions processed concurrently; the rest queue.
    #[arg(long = "max-sessions", default_value_t = 4)]
    max_sessions: usize,

    /// Enforce one oracle-request interval across *all* sessions, in seconds.
    /// Omit to rate-limit per session only.
    #[arg(long = "shared-oracle-interval")]
    shared_oracle_interval_seconds: Option<f64>,
}

type ServerPipeline = Pipeline<HttpTranscriptSource, HttpOracle>;

#[derive(Clone)]
struct AppState {
    pipeline: ServerPipeline,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    video: String,
    #[serde(default)]
    options: ClipOptions,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: SessionId,
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[tokio::main]
async fn main() {
    whittle::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "whittle-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let params = Params::parse();

    metrics::init();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let client = reqwest::Client::new();
    let source = HttpTranscriptSource::new(client.clone(), &params.captions_url);
    let oracle = HttpOracle::new(client, &params.oracle_url);

    let shared_limiter = params.shared_oracle_interval_seconds.map(|seconds| {
        info!(seconds, "sharing one oracle rate limiter across sessions");
        Arc::new(RateLimiter::new(Duration::from_secs_f64(seconds)))
    });

    let config = PipelineConfig {
        max_concurrent_sessions: params.max_sessions,
        shared_limiter,
    };

    let state = AppState {
        pipeline: Pipeline::new(source, oracle, config),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}", get(get_session))
        .route("/v1/sessions/{id}/events", get(session_events))
        .route("/v1/sessions/{id}/cancel", post(cancel_session))
        .route_layer(axum::middleware::from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> &'static str {
    "whittle-server: POST /v1/sessions, then GET /v1/sessions/{id}/events"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> std::result::Result<Json<CreateSessionResponse>, AppError> {
    if request.video.trim().is_empty() {
        return Err(AppError::bad_request("video must not be empty"));
    }

    let session_id = state
        .pipeline
        .start_session(&request.video, request.options)
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    metrics::session_started();
    Ok(Json(CreateSessionResponse { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Response, AppError> {
    let id = parse_session_id(&id)?;
    let session = state
        .pipeline
        .get_session(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("no session '{id}'")))?;

    Ok(Json(session).into_response())
}

async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, AppError>
{
    let id = parse_session_id(&id)?;
    let progress = state
        .pipeline
        .subscribe(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("no session '{id}'")))?;

    // The stream is finite: it ends after the session's terminal event.
    let stream = futures_util::stream::unfold(progress, |mut progress| async move {
        let event = progress.next().await?;
        match Event::default().event("progress").json_data(&event) {
            Ok(sse_event) => Some((Ok(sse_event), progress)),
            Err(err) => {
                warn!(error = %err, "failed to encode progress event, closing stream");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Json<CancelResponse>, AppError> {
    let id = parse_session_id(&id)?;
    let cancelled = state.pipeline.cancel(id).await;
    if !cancelled {
        return Err(AppError::not_found(format!("no session '{id}'")));
    }
    Ok(Json(CancelResponse { cancelled }))
}

fn parse_session_id(raw: &str) -> std::result::Result<SessionId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("'{raw}' is not a valid session id")))
}
