//! HTTP surface — the axum router and its handlers.

pub mod chunks;
pub mod export;
pub mod projects;
pub mod scrape;

use crate::core::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "sitepack",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/api/settings/{key}",
            get(projects::get_setting).put(projects::put_setting),
        )
        .route("/api/scrape/discover", post(scrape::discover))
        .route("/api/scrape/sitemap", post(scrape::parse_sitemap_url))
        .route("/api/scrape/content", post(scrape::scrape_content))
        .route("/api/scrape/crawl", post(scrape::crawl))
        .route("/api/projects/{id}/chunks", post(chunks::run_chunking))
        .route(
            "/api/projects/{id}/chunks/stream",
            get(chunks::stream_chunking),
        )
        .route(
            "/api/projects/{id}/chunks/cancel",
            post(chunks::cancel_chunking),
        )
        .route("/api/projects/{id}/rag-pack", get(export::rag_pack))
        .route("/api/projects/{id}/export/csv", get(export::export_csv))
        .route(
            "/api/projects/{id}/export/parquet",
            get(export::export_parquet),
        )
        .route(
            "/api/projects/{id}/export/incremental",
            get(export::export_incremental),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
