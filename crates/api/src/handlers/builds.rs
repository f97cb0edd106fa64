//! Build history handlers and the live output stream endpoint.
//!
//! The stream endpoint is the read side of the engine's output channel:
//! while a build is in flight it relays the live channel; once the channel
//! is gone it replays the persisted log, which is the authoritative record.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::Json;
use runforge_core::error::CoreError;
use runforge_core::types::DbId;
use runforge_db::models::build::Build;
use runforge_db::repositories::{BuildRepo, ScriptRepo};
use runforge_engine::registry::BuildEvent;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Payload of the final stream event. Distinguishable from real output
/// lines for any script that does not print it itself.
pub const DONE_MARKER: &str = "[DONE]";

/// Bounded wait for the next live line. Elapsing ends the stream for this
/// client only — the run itself is unaffected.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Full persisted output of a build.
#[derive(Debug, Serialize)]
pub struct BuildOutput {
    pub output: String,
}

/// GET /scripts/{id}/builds
///
/// Build history for a script, most recently started first.
pub async fn list_builds(
    State(state): State<AppState>,
    Path(script_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<Build>>>> {
    ScriptRepo::find_by_id(&state.pool, script_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "script",
            id: script_id,
        }))?;

    let builds = BuildRepo::list_by_script(&state.pool, script_id).await?;
    Ok(Json(DataResponse { data: builds }))
}

/// GET /builds/{id}
///
/// Build detail.
pub async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Build>>> {
    let build = BuildRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "build",
            id,
        }))?;

    Ok(Json(DataResponse { data: build }))
}

/// GET /builds/{id}/output
///
/// Full persisted log content. Empty string when no log was written.
pub async fn get_build_output(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BuildOutput>>> {
    let build = BuildRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "build",
            id,
        }))?;

    let output = match build.log_file {
        Some(path) => tokio::fs::read_to_string(&path).await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(Json(DataResponse {
        data: BuildOutput { output },
    }))
}

/// GET /builds/{id}/stream
///
/// Server-sent event stream of a build's output: one event per line,
/// terminated by a [`DONE_MARKER`] event. Clients always see the marker,
/// even on internal error paths.
///
/// A build that finishes between the registry lookup and the first read
/// falls back to the log on its next request; the log is flushed before
/// channel teardown, so nothing is lost.
pub async fn stream_build(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> Sse<KeepAliveStream<UnboundedReceiverStream<Result<Event, Infallible>>>> {
    let (tx, rx) = mpsc::unbounded_channel();

    match state.registry.subscribe(id).await {
        // Build in flight: relay the live channel.
        Some(live) => {
            tokio::spawn(pump_live(live, tx));
        }
        // Already finished, or unknown id: replay the persisted log.
        None => {
            let log_file = BuildRepo::find_by_id(&state.pool, id)
                .await
                .ok()
                .flatten()
                .and_then(|b| b.log_file);
            tokio::spawn(pump_log(log_file, tx));
        }
    }

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

type EventSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

fn send_line(tx: &EventSender, line: &str) -> bool {
    // SSE event data cannot carry CR/LF. Lines are newline-split upstream,
    // but a bare carriage return mid-line (progress bars) must be stripped.
    let line = if line.contains('\r') {
        line.replace('\r', "")
    } else {
        line.to_string()
    };
    tx.send(Ok(Event::default().data(line))).is_ok()
}

fn send_done(tx: &EventSender) {
    let _ = tx.send(Ok(Event::default().data(DONE_MARKER)));
}

/// Relay live channel events until the terminal marker, the idle timeout,
/// or client disconnect.
async fn pump_live(mut live: broadcast::Receiver<BuildEvent>, tx: EventSender) {
    loop {
        match tokio::time::timeout(STREAM_IDLE_TIMEOUT, live.recv()).await {
            // Liveness safeguard for hung or silent scripts: end this
            // stream, leave the process running.
            Err(_elapsed) => {
                send_done(&tx);
                break;
            }
            Ok(Ok(BuildEvent::Line(line))) => {
                if !send_line(&tx, &line) {
                    break;
                }
            }
            Ok(Ok(BuildEvent::Done)) => {
                send_done(&tx);
                break;
            }
            // This reader fell behind the broadcast buffer; the skipped
            // lines are still in the log.
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::debug!(skipped, "stream reader lagged behind live output");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                send_done(&tx);
                break;
            }
        }
    }
}

/// Replay the persisted log, then the terminal marker. No log, marker only.
async fn pump_log(log_file: Option<String>, tx: EventSender) {
    if let Some(path) = log_file {
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            for line in content.lines() {
                if !send_line(&tx, line) {
                    return;
                }
            }
        }
    }
    send_done(&tx);
}
