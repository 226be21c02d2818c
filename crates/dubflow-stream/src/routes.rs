//! HTTP surface: streaming and blocking execution, cancellation, status,
//! and gate passing.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use dubflow_manifest::Manifest;
use dubflow_phases::{GATES, STAGES, registry};
use dubflow_runner::{LaunchOptions, RunEvent, RunnerError, run_video};

use crate::events::SseSink;
use crate::state::{AppState, RunHandle};
use crate::status::pipeline_status_for;

/// Wall-clock safety rail for the blocking run endpoint. Not a correctness
/// mechanism; streaming callers have no runner-level timeout at all.
const BLOCKING_RUN_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Pipeline already running for this episode")]
    WorkspaceLocked,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Blocking run exceeded {}s", BLOCKING_RUN_TIMEOUT.as_secs())]
    Timeout,

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::WorkspaceLocked => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub from_phase: Option<String>,
    #[serde(default)]
    pub to_phase: Option<String>,
}

impl RunRequest {
    /// An empty body means "run everything"; anything else must be valid
    /// JSON.
    fn from_body(body: &axum::body::Bytes) -> Result<Self, ApiError> {
        if body.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Malformed run request: {e}")))
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: &'static str,
    pub phases: Vec<PhaseOutcome>,
    pub halted_at_gate: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PhaseOutcome {
    pub name: String,
    pub skipped: bool,
}

/// The API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/episodes/{ep}/pipeline/status", get(pipeline_status))
        .route("/episodes/{ep}/pipeline/run-stream", post(run_stream))
        .route("/episodes/{ep}/pipeline/run", post(run_blocking))
        .route("/episodes/{ep}/pipeline/cancel", post(cancel_pipeline))
        .route("/episodes/{ep}/gates/{gate}/pass", post(pass_gate))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "streaming API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn pipeline_status(
    State(state): State<AppState>,
    Path(ep): Path<String>,
) -> Result<Json<crate::status::PipelineStatus>, ApiError> {
    let video = state
        .find_video(&ep)
        .ok_or_else(|| ApiError::NotFound(format!("Video file not found for {ep}")))?;
    let workspace = state.workspace_for(&video);
    pipeline_status_for(&workspace, &registry(), GATES, STAGES)
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// SSE streaming execution. Events for one run arrive in generation order;
/// the stream closes after the terminal `done` (or a cancellation `error`).
async fn run_stream(
    State(state): State<AppState>,
    Path(ep): Path<String>,
    body: axum::body::Bytes,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = RunRequest::from_body(&body)?;
    let video = state
        .find_video(&ep)
        .ok_or_else(|| ApiError::NotFound(format!("Video file not found for {ep}")))?;
    let handle = state.try_claim(&ep).ok_or(ApiError::WorkspaceLocked)?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let desc = match (&request.from_phase, &request.to_phase) {
        (None, None) => "auto-advance".to_string(),
        (from, to) => format!("--from {from:?} --to {to:?}"),
    };
    let _ = tx.send(("log", serde_json::json!({ "line": format!("Pipeline started: {desc}") })));

    spawn_run(state, ep, video, request, handle, tx);

    let stream = UnboundedReceiverStream::new(rx)
        .map(|(kind, payload)| Ok(Event::default().event(kind).data(payload.to_string())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Run the pipeline on a blocking task, forwarding events to `tx` and
/// framing the terminal event per the outcome.
fn spawn_run(
    state: AppState,
    ep: String,
    video: camino::Utf8PathBuf,
    request: RunRequest,
    handle: RunHandle,
    tx: tokio::sync::mpsc::UnboundedSender<(&'static str, serde_json::Value)>,
) {
    tokio::task::spawn_blocking(move || {
        let sink = SseSink::new(tx.clone());
        let outcome = run_video(
            &registry(),
            GATES,
            &state.config,
            &video,
            LaunchOptions {
                from: request.from_phase.as_deref(),
                to: request.to_phase.as_deref(),
            },
            &sink,
            Some(handle.cancel.clone()),
        );

        match outcome {
            Ok(_) => {
                use dubflow_runner::EventSink;
                sink.emit(RunEvent::Done { returncode: 0 });
            }
            Err(RunnerError::Cancelled) => {
                let _ = tx.send((
                    "error",
                    serde_json::json!({ "message": "Pipeline cancelled" }),
                ));
            }
            Err(e) => {
                let _ = tx.send(("error", serde_json::json!({ "message": e.to_string() })));
                let _ = tx.send((
                    "done",
                    serde_json::json!({ "returncode": e.exit_code() }),
                ));
            }
        }
        state.release(&ep);
    });
}

/// Blocking execution with the wall-clock rail.
async fn run_blocking(
    State(state): State<AppState>,
    Path(ep): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request = RunRequest::from_body(&body)?;
    let video = state
        .find_video(&ep)
        .ok_or_else(|| ApiError::NotFound(format!("Video file not found for {ep}")))?;
    let handle = state.try_claim(&ep).ok_or(ApiError::WorkspaceLocked)?;

    let cancel = handle.cancel.clone();
    let config = state.config.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        run_video(
            &registry(),
            GATES,
            &config,
            &video,
            LaunchOptions {
                from: request.from_phase.as_deref(),
                to: request.to_phase.as_deref(),
            },
            &dubflow_runner::NullSink,
            Some(cancel),
        )
    });

    match tokio::time::timeout(BLOCKING_RUN_TIMEOUT, &mut task).await {
        Err(_) => {
            // Ask the runner to stop at the next phase boundary; the lock
            // is held until it actually does.
            handle.cancel.store(true, Ordering::SeqCst);
            tokio::spawn(async move {
                let _ = task.await;
                state.release(&ep);
            });
            Err(ApiError::Timeout)
        }
        Ok(join_result) => {
            state.release(&ep);
            match join_result {
                Err(join_error) => Err(ApiError::Internal(join_error.to_string())),
                Ok(Ok(summary)) => Ok(Json(RunResponse {
                    status: "succeeded",
                    phases: summary
                        .phases
                        .iter()
                        .map(|p| PhaseOutcome {
                            name: p.name.clone(),
                            skipped: p.skipped,
                        })
                        .collect(),
                    halted_at_gate: summary.halted_at_gate,
                })),
                Ok(Err(e)) => Err(ApiError::Internal(e.to_string())),
            }
        }
    }
}

async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(ep): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let handle = state
        .live_handle(&ep)
        .ok_or_else(|| ApiError::NotFound("No running pipeline for this episode".to_string()))?;
    handle.cancel.store(true, Ordering::SeqCst);
    Ok(Json(serde_json::json!({ "status": "cancelled" })))
}

async fn pass_gate(
    State(state): State<AppState>,
    Path((ep, gate)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !GATES.iter().any(|g| g.key == gate) {
        return Err(ApiError::NotFound(format!("Unknown gate: {gate}")));
    }
    let video = state
        .find_video(&ep)
        .ok_or_else(|| ApiError::NotFound(format!("Video file not found for {ep}")))?;
    let workspace = state.workspace_for(&video);
    let manifest_path = dubflow_utils::paths::manifest_path(&workspace);
    if !manifest_path.as_std_path().is_file() {
        return Err(ApiError::NotFound(format!(
            "No pipeline state for {ep} yet"
        )));
    }

    let mut manifest =
        Manifest::load(&manifest_path).map_err(|e| ApiError::Internal(e.to_string()))?;
    manifest.pass_gate(&gate);
    manifest
        .save()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(serde_json::json!({ "status": "passed", "gate": gate })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_runs_everything() {
        let request = RunRequest::from_body(&axum::body::Bytes::new()).unwrap();
        assert!(request.from_phase.is_none());
        assert!(request.to_phase.is_none());
    }

    #[test]
    fn json_body_selects_the_range() {
        let body = axum::body::Bytes::from_static(
            br#"{"from_phase": "mt", "to_phase": "burn"}"#,
        );
        let request = RunRequest::from_body(&body).unwrap();
        assert_eq!(request.from_phase.as_deref(), Some("mt"));
        assert_eq!(request.to_phase.as_deref(), Some("burn"));
    }

    #[test]
    fn garbage_body_is_a_bad_request() {
        let body = axum::body::Bytes::from_static(b"to_phase=burn");
        assert!(matches!(
            RunRequest::from_body(&body),
            Err(ApiError::BadRequest(_))
        ));
    }
}
