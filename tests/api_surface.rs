//! Router-level tests driven through `tower::ServiceExt::oneshot` — no
//! network, in-memory store.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sitepack::api;
use sitepack::model::{Element, PageResult, ScrapedPage};
use sitepack::storage::{JsonFileStore, ProjectRepository};
use sitepack::AppState;
use std::sync::Arc;
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    let repo: Arc<dyn ProjectRepository> = Arc::new(JsonFileStore::in_memory());
    Arc::new(AppState::new(reqwest::Client::new(), repo))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_scraped_project(state: &Arc<AppState>, paragraph: &str) -> i64 {
    let project = state
        .repo
        .create(sitepack::types::CreateProjectRequest {
            domain: "example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let page = ScrapedPage {
        url: "https://example.com/a".into(),
        title: "Alpha".into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
        word_count: 12,
        language: "en".into(),
        elements: vec![
            Element::Heading {
                level: 1,
                text: "Alpha".into(),
            },
            Element::Paragraph {
                text: paragraph.into(),
            },
        ],
        structured_data: None,
    };
    state
        .repo
        .append_results(
            project.id,
            vec![PageResult {
                url: page.url.clone(),
                success: true,
                data: Some(page),
                error: None,
                used_proxy: None,
            }],
        )
        .await
        .unwrap();
    project.id
}

#[tokio::test]
async fn health_endpoint_reports_service() {
    let response = api::router(test_state()).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "sitepack");
}

#[tokio::test]
async fn project_crud_lifecycle() {
    let state = test_state();

    // Create
    let response = api::router(Arc::clone(&state))
        .oneshot(json_request(
            "POST",
            "/api/projects",
            json!({"domain": "docs.example.com", "displayName": "Docs"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["displayName"], "Docs");
    assert_eq!(created["status"], "idle");

    // Read
    let response = api::router(Arc::clone(&state))
        .oneshot(get(&format!("/api/projects/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Partial update
    let response = api::router(Arc::clone(&state))
        .oneshot(json_request(
            "PUT",
            &format!("/api/projects/{id}"),
            json!({"status": "content_scraping"}),
        ))
        .await
        .unwrap();
    let updated = body_json(response).await;
    assert_eq!(updated["status"], "content_scraping");
    assert_eq!(updated["domain"], "docs.example.com");

    // List
    let response = api::router(Arc::clone(&state))
        .oneshot(get("/api/projects"))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Delete
    let response = api::router(Arc::clone(&state))
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/projects/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = api::router(state)
        .oneshot(get(&format!("/api/projects/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_without_domain_is_field_error() {
    let response = api::router(test_state())
        .oneshot(json_request("POST", "/api/projects", json!({"domain": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["field"], "domain");
    assert!(body["message"].as_str().unwrap().contains("domain"));
}

#[tokio::test]
async fn settings_store_round_trips() {
    let state = test_state();

    let response = api::router(Arc::clone(&state))
        .oneshot(get("/api/settings/theme"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api::router(Arc::clone(&state))
        .oneshot(json_request("PUT", "/api/settings/theme", json!("dark")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api::router(state)
        .oneshot(get("/api/settings/theme"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!("dark"));
}

#[tokio::test]
async fn chunking_then_pack_and_incremental() {
    let state = test_state();
    let id = seed_scraped_project(
        &state,
        "A body paragraph with enough words to produce a retrievable chunk.",
    )
    .await;

    // One-shot chunking returns the terminal event.
    let response = api::router(Arc::clone(&state))
        .oneshot(json_request(
            "POST",
            &format!("/api/projects/{id}/chunks"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let terminal = body_json(response).await;
    assert_eq!(terminal["type"], "complete");
    assert!(terminal["chunksGenerated"].as_u64().unwrap() >= 1);

    // RAG pack is a zip attachment.
    let response = api::router(Arc::clone(&state))
        .oneshot(get(&format!("/api/projects/{id}/rag-pack")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // Zip local-file-header magic.
    assert_eq!(&bytes[..4], b"PK\x03\x04");

    // First incremental export: everything new.
    let response = api::router(Arc::clone(&state))
        .oneshot(get(&format!("/api/projects/{id}/export/incremental")))
        .await
        .unwrap();
    let diff = body_json(response).await;
    assert!(diff["stats"]["totalNew"].as_u64().unwrap() >= 1);
    assert_eq!(diff["stats"]["totalUpdated"], 0);

    // Second incremental export with no change: all empty.
    let response = api::router(Arc::clone(&state))
        .oneshot(get(&format!("/api/projects/{id}/export/incremental")))
        .await
        .unwrap();
    let diff = body_json(response).await;
    assert_eq!(diff["stats"]["totalNew"], 0);
    assert_eq!(diff["stats"]["totalUpdated"], 0);
    assert_eq!(diff["stats"]["totalDeleted"], 0);

    // CSV export streams a header row.
    let response = api::router(Arc::clone(&state))
        .oneshot(get(&format!("/api/projects/{id}/export/csv")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("chunk_id,doc_id,text,url"));
}

#[tokio::test]
async fn chunking_without_content_is_precondition_failure() {
    let state = test_state();
    let project = state
        .repo
        .create(sitepack::types::CreateProjectRequest {
            domain: "empty.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    let response = api::router(Arc::clone(&state))
        .oneshot(json_request(
            "POST",
            &format!("/api/projects/{}/chunks", project.id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("content"));
}

#[tokio::test]
async fn pack_for_unchunked_project_is_bad_request() {
    let state = test_state();
    let id = seed_scraped_project(&state, "Some scraped but never chunked text here.").await;
    let response = api::router(state)
        .oneshot(get(&format!("/api/projects/{id}/rag-pack")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_without_job_reports_false() {
    let state = test_state();
    let response = api::router(state)
        .oneshot(json_request(
            "POST",
            "/api/projects/42/chunks/cancel",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], false);
}

#[tokio::test]
async fn missing_project_is_not_found_everywhere() {
    for uri in [
        "/api/projects/999",
        "/api/projects/999/rag-pack",
        "/api/projects/999/export/csv",
        "/api/projects/999/export/incremental",
    ] {
        let response = api::router(test_state()).oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {uri}");
    }
}
