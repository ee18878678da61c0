//! Project CRUD and the scalar settings store.

use crate::core::types::{
    CreateProjectRequest, ErrorBody, ProjectSummary, UpdateProjectRequest,
};
use crate::core::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;
use tracing::error;

type ApiError = (StatusCode, Json<ErrorBody>);

pub(super) fn internal_error(err: impl std::fmt::Display) -> ApiError {
    error!("storage error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("storage unavailable")),
    )
}

pub(super) fn not_found(what: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(format!("{what} not found"))),
    )
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let projects = state.repo.list().await.map_err(internal_error)?;
    Ok(Json(
        projects.into_iter().map(ProjectSummary::from_project).collect(),
    ))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<crate::core::model::Project>, ApiError> {
    state
        .repo
        .get(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("project"))
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<crate::core::model::Project>), ApiError> {
    if request.domain.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::for_field("domain is required", "domain")),
        ));
    }
    let project = state.repo.create(request).await.map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(patch): Json<UpdateProjectRequest>,
) -> Result<Json<crate::core::model::Project>, ApiError> {
    state
        .repo
        .update(id, patch)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("project"))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete(id).await.map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("project"))
    }
}

pub async fn get_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .repo
        .get_setting(&key)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("setting"))
}

pub async fn put_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .repo
        .put_setting(&key, value.clone())
        .await
        .map_err(internal_error)?;
    Ok(Json(value))
}
