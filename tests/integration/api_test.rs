//! HTTP API round-trips: submission, status, listing, and probes.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use jobhub_core::config::AppConfig;
use jobhub_store::memory::MemoryJobStore;
use jobhub_store::{JobStore, StoreManager};
use jobhub_worker::{HealthReporter, HealthTracker};

use crate::helpers::*;

struct TestApi {
    router: Router,
    store: Arc<dyn JobStore>,
    tracker: Arc<HealthTracker>,
}

fn api(categories: Vec<jobhub_core::registry::CategoryEntry>) -> TestApi {
    let registry = registry(categories);
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
    let tracker = Arc::new(HealthTracker::new());
    let health = Arc::new(HealthReporter::new(
        store.clone(),
        Arc::clone(&registry),
        Arc::clone(&tracker),
    ));

    let state = jobhub_api::AppState {
        config: Arc::new(AppConfig::default()),
        store: Arc::new(StoreManager::from_store(store.clone())),
        registry,
        health,
    };

    TestApi {
        router: jobhub_api::build_router(state),
        store,
        tracker,
    }
}

async fn request(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_submit_and_poll_status() {
    let api = api(vec![category("export", 1, 3)]);

    let (status, body) = request(
        &api.router,
        post_json("/api/jobs", json!({"category": "export", "payload": {"dataset": 3}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["state"], "pending");
    assert_eq!(body["data"]["max_attempts"], 3);

    let id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = request(&api.router, get(&format!("/api/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["category"], "export");
    assert_eq!(body["data"]["attempt"], 0);
}

#[tokio::test]
async fn test_submit_unknown_category_rejected() {
    let api = api(vec![category("export", 1, 3)]);

    let (status, body) = request(
        &api.router,
        post_json("/api/jobs", json!({"category": "imports", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UNKNOWN_CATEGORY");
}

#[tokio::test]
async fn test_submit_empty_category_fails_validation() {
    let api = api(vec![category("export", 1, 3)]);

    let (status, body) = request(
        &api.router,
        post_json("/api/jobs", json!({"category": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_get_missing_job_not_found() {
    let api = api(vec![category("export", 1, 3)]);

    let id = uuid::Uuid::new_v4();
    let (status, body) = request(&api.router, get(&format!("/api/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_jobs_filters_by_state() {
    let api = api(vec![category("export", 1, 3)]);
    for i in 0..3 {
        api.store.submit("export", json!({"n": i})).await.unwrap();
    }

    let (status, body) = request(&api.router, get("/api/jobs?state=pending&page_size=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_items"], 3);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let (_, body) = request(&api.router, get("/api/jobs?state=succeeded")).await;
    assert_eq!(body["data"]["total_items"], 0);
}

#[tokio::test]
async fn test_health_endpoints() {
    let api = api(vec![category("export", 1, 3)]);

    let (status, body) = request(&api.router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    // No pools started: the instance is live and ready (API-only mode).
    let (status, _) = request(&api.router, get("/api/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&api.router, get("/api/health/ready")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&api.router, get("/api/health/categories")).await;
    assert_eq!(status, StatusCode::OK);
    let categories = body["data"].as_array().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["category"], "export");
    assert_eq!(categories[0]["ready"], false);
}

#[tokio::test]
async fn test_readiness_follows_pool_state() {
    let api = api(vec![category("export", 1, 3)]);

    api.tracker.pool_started("export");
    let (status, _) = request(&api.router, get("/api/health/ready")).await;
    assert_eq!(status, StatusCode::OK);

    api.tracker.pool_stopped("export");
    let (status, body) = request(&api.router, get("/api/health/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
}

#[tokio::test]
async fn test_status_reflects_worker_outcome() {
    // End to end: submit over HTTP, execute with a pool, poll over HTTP.
    let registry = registry(vec![category("export", 1, 3)]);
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
    let tracker = Arc::new(HealthTracker::new());
    let health = Arc::new(HealthReporter::new(
        store.clone(),
        Arc::clone(&registry),
        Arc::clone(&tracker),
    ));
    let state = jobhub_api::AppState {
        config: Arc::new(AppConfig::default()),
        store: Arc::new(StoreManager::from_store(store.clone())),
        registry: Arc::clone(&registry),
        health,
    };
    let router = jobhub_api::build_router(state);

    let worker = TestWorker::start_with_store(
        registry,
        store.clone(),
        vec![SucceedHandler::new("export", json!({"archive": "a.zip"}))],
        test_settings(),
    );

    let (status, body) = request(
        &router,
        post_json("/api/jobs", json!({"category": "export", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let id: uuid::Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    wait_for_state(
        &*store,
        id,
        jobhub_entity::job::JobState::Succeeded,
        Duration::from_secs(5),
    )
    .await;

    let (status, body) = request(&router, get(&format!("/api/jobs/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "succeeded");
    assert_eq!(body["data"]["result"], json!({"archive": "a.zip"}));

    worker.shutdown().await;
}
