//! Chunking-job endpoints: one-shot run, server-sent event stream, cancel.

use crate::api::projects::internal_error;
use crate::core::errors::PipelineError;
use crate::core::types::{ErrorBody, ProgressEvent};
use crate::core::AppState;
use crate::pipeline::orchestrator::{self, JobStarted};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

type ApiError = (StatusCode, Json<ErrorBody>);

fn map_pipeline_error(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::JobAlreadyRunning(_) => StatusCode::CONFLICT,
        PipelineError::NoScrapedContent => StatusCode::BAD_REQUEST,
        PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody::new(err.to_string())))
}

fn is_terminal(event: &ProgressEvent) -> bool {
    matches!(
        event,
        ProgressEvent::Complete { .. }
            | ProgressEvent::Cancelled { .. }
            | ProgressEvent::Error { .. }
    )
}

/// POST /api/projects/{id}/chunks — run the job to completion and return the
/// terminal event.
pub async fn run_chunking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProgressEvent>, ApiError> {
    let JobStarted { mut events, .. } =
        orchestrator::start_job(state.job_context(), Arc::clone(&state.jobs), id)
            .await
            .map_err(map_pipeline_error)?;

    loop {
        match events.recv().await {
            Ok(event) if is_terminal(&event) => return Ok(Json(event)),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("chunking listener lagged by {skipped} events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(internal_error("job ended without a terminal event"));
            }
        }
    }
}

/// GET /api/projects/{id}/chunks/stream — SSE progress stream. Attaches to a
/// live job when one exists, otherwise starts one.
pub async fn stream_chunking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let receiver = match state.jobs.get(id) {
        Some(live) => live.subscribe(),
        None => {
            orchestrator::start_job(state.job_context(), Arc::clone(&state.jobs), id)
                .await
                .map_err(map_pipeline_error)?
                .events
        }
    };

    let stream = BroadcastStream::new(receiver)
        // Lagged receivers drop the missed events and keep streaming.
        .filter_map(|item| future::ready(item.ok()))
        .scan(false, |done, event| {
            if *done {
                return future::ready(None);
            }
            *done = is_terminal(&event);
            future::ready(Some(event))
        })
        .map(|event| {
            Ok(Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}")))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /api/projects/{id}/chunks/cancel — flip the live job's cancel flag.
pub async fn cancel_chunking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Json<serde_json::Value> {
    let cancelled = state.jobs.cancel(id);
    Json(serde_json::json!({ "cancelled": cancelled }))
}
