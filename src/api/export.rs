//! Export endpoints: the zip RAG pack, CSV/Parquet projections, and the
//! incremental diff.

use crate::api::projects::{internal_error, not_found};
use crate::core::model::Project;
use crate::core::types::ErrorBody;
use crate::core::AppState;
use crate::export::{diff, pack, tabular};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use tracing::info;

type ApiError = (StatusCode, Json<ErrorBody>);

async fn project_with_chunks(state: &AppState, id: i64) -> Result<Project, ApiError> {
    let project = state
        .repo
        .get(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("project"))?;
    if project.chunks.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(
                "project has no chunks yet — run chunking first",
            )),
        ));
    }
    Ok(project)
}

fn attachment(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// GET /api/projects/{id}/rag-pack
pub async fn rag_pack(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let project = project_with_chunks(&state, id).await?;
    let include_embeddings = project.settings.export.include_embeddings;
    let bytes = pack::pack(&project, include_embeddings).map_err(internal_error)?;
    info!(
        "rag pack for project {} built ({} bytes, {} chunks)",
        id,
        bytes.len(),
        project.chunks.len()
    );
    let filename = format!("{}-rag-pack.zip", project.domain.replace('.', "-"));
    Ok(attachment(bytes, "application/zip", &filename))
}

/// GET /api/projects/{id}/export/csv
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let project = project_with_chunks(&state, id).await?;
    let bytes = tabular::to_csv(&project.chunks, project.settings.export.include_embeddings)
        .map_err(internal_error)?;
    let filename = format!("{}-chunks.csv", project.domain.replace('.', "-"));
    Ok(attachment(bytes, "text/csv; charset=utf-8", &filename))
}

/// GET /api/projects/{id}/export/parquet
pub async fn export_parquet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let project = project_with_chunks(&state, id).await?;
    let bytes = tabular::to_parquet(&project.chunks, project.settings.export.include_embeddings)
        .map_err(internal_error)?;
    let filename = format!("{}-chunks.parquet", project.domain.replace('.', "-"));
    Ok(attachment(bytes, "application/vnd.apache.parquet", &filename))
}

/// GET /api/projects/{id}/export/incremental — diff against the last export
/// snapshot, then persist the new snapshot.
pub async fn export_incremental(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<diff::IncrementalDiff>, ApiError> {
    let mut project = project_with_chunks(&state, id).await?;
    let result = diff::incremental_diff(&project);

    project.exported_chunk_hashes = Some(diff::snapshot(&project));
    project.last_exported_at = Some(result.exported_at.clone());
    state.repo.save(&project).await.map_err(internal_error)?;

    info!(
        "incremental diff for project {}: {} new, {} updated, {} deleted",
        id, result.stats.total_new, result.stats.total_updated, result.stats.total_deleted
    );
    Ok(Json(result))
}
