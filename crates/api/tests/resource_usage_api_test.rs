use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use resource_status_api::routes::{create_routes, AppState};
use resource_status_core::{
    AckHandle, ClaimedRequest, CollectionPayload, ConnectionState, EnqueueOptions, ErrorRecord,
    JobKind, MonitorResult, NewResourceSample, QueueCounts, RequestStatus, RetryDecision,
    SampleStore, WorkQueue,
};
use resource_status_infrastructure::{InMemoryWorkQueue, SqliteSampleStore};
use sqlx::sqlite::SqlitePoolOptions;

const API_KEY: &str = "test-key";

struct TestApp {
    router: Router,
    store: Arc<SqliteSampleStore>,
    queue: Arc<InMemoryWorkQueue>,
}

/// Redis 不可达时的队列：报告给定的连接状态，所有命令一直挂起
struct StalledQueue {
    state: ConnectionState,
}

#[async_trait]
impl WorkQueue for StalledQueue {
    async fn enqueue(
        &self,
        _kind: JobKind,
        _payload: CollectionPayload,
        _options: EnqueueOptions,
    ) -> MonitorResult<String> {
        std::future::pending().await
    }

    async fn try_dequeue(&self) -> MonitorResult<Option<ClaimedRequest>> {
        std::future::pending().await
    }

    async fn ack(&self, _handle: &AckHandle) -> MonitorResult<()> {
        std::future::pending().await
    }

    async fn nack(&self, _handle: &AckHandle, _error: &ErrorRecord) -> MonitorResult<RetryDecision> {
        std::future::pending().await
    }

    async fn find(&self, _request_id: &str) -> MonitorResult<Option<RequestStatus>> {
        std::future::pending().await
    }

    async fn counts(&self) -> MonitorResult<QueueCounts> {
        std::future::pending().await
    }

    async fn connection_state(&self) -> ConnectionState {
        self.state
    }

    async fn close(&self) -> MonitorResult<()> {
        Ok(())
    }
}

async fn memory_store() -> Arc<SqliteSampleStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(SqliteSampleStore::new(pool));
    store.migrate().await.unwrap();
    store
}

async fn setup() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Arc::new(SqliteSampleStore::new(pool));
    store.migrate().await.unwrap();
    let queue = Arc::new(InMemoryWorkQueue::new());

    let state = AppState::new(store.clone(), queue.clone(), API_KEY);
    TestApp {
        router: create_routes(state),
        store,
        queue,
    }
}

fn sample(cpu: f64, mem: (u64, u64), disk: (u64, u64), day: u32, hour: u32) -> NewResourceSample {
    NewResourceSample {
        cpu_usage: cpu,
        memory_used_mb: mem.0,
        memory_total_mb: mem.1,
        disk_used_mb: disk.0,
        disk_total_mb: disk.1,
        created_at: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_missing_api_key_is_rejected_without_enqueue() {
    let app = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/resource-usage/check")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, serde_json::json!({ "error": "API key is required" }));
    assert_eq!(app.queue.counts().await.unwrap().waiting, 0);
}

#[tokio::test]
async fn test_wrong_api_key_is_rejected_without_enqueue() {
    let app = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/resource-usage/check")
        .header("x-api-key", "nope")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid API key");
    assert_eq!(app.queue.counts().await.unwrap().waiting, 0);
}

#[tokio::test]
async fn test_check_enqueues_manual_request() {
    let app = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/resource-usage/check")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let job_id = body["jobId"].as_str().unwrap();

    let found = app.queue.find(job_id).await.unwrap().unwrap();
    assert_eq!(found.request.job_kind.as_str(), "manual-collect-resource-usage");
    assert_eq!(app.queue.counts().await.unwrap().waiting, 1);
}

#[tokio::test]
async fn test_latest_returns_404_on_empty_store() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/api/resource-usage/latest")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No resource usage data found");
}

#[tokio::test]
async fn test_latest_returns_inserted_row_verbatim() {
    let app = setup().await;
    app.store
        .insert(&sample(10.0, (100, 200), (300, 400), 1, 0))
        .await
        .unwrap();
    let newest = app
        .store
        .insert(&sample(12.5, (1024, 8192), (50_000, 100_000), 1, 6))
        .await
        .unwrap();

    let (status, body) = send_json(&app.router, get("/api/resource-usage/latest")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["id"], newest.id);
    assert_eq!(data["cpu_usage"], 12.5);
    assert_eq!(data["memory_used_mb"], 1024);
    assert_eq!(data["memory_total_mb"], 8192);
    assert_eq!(data["disk_used_mb"], 50_000);
    assert_eq!(data["disk_total_mb"], 100_000);
    assert_eq!(data["created_at"], "2024-01-01T06:00:00Z");
}

#[tokio::test]
async fn test_stats_over_two_days() {
    let app = setup().await;
    for s in [
        sample(10.0, (256, 1024), (750, 1000), 1, 0),
        sample(20.0, (512, 1024), (250, 1000), 1, 12),
        sample(30.0, (768, 1024), (500, 1000), 2, 0),
        // endDate 为当天零点，之后的样本不计入
        sample(90.0, (1024, 1024), (1000, 1000), 2, 6),
    ] {
        app.store.insert(&s).await.unwrap();
    }

    let (status, body) = send_json(
        &app.router,
        get("/api/resource-usage/stats?startDate=2024-01-01&endDate=2024-01-02"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["totalRecords"], 3);
    assert_eq!(data["cpu"]["avg"], 20.0);
    assert_eq!(data["cpu"]["min"], 10.0);
    assert_eq!(data["cpu"]["max"], 30.0);
    assert_eq!(data["memory"]["avg"], 50.0);
    assert_eq!(data["memory"]["min"], 25.0);
    assert_eq!(data["memory"]["max"], 75.0);
    assert_eq!(data["disk"]["avg"], 50.0);
    assert_eq!(data["disk"]["min"], 25.0);
    assert_eq!(data["disk"]["max"], 75.0);
    assert_eq!(data["dateRange"]["start"], "2024-01-01T00:00:00Z");
    assert_eq!(data["dateRange"]["end"], "2024-01-02T00:00:00Z");
}

#[tokio::test]
async fn test_stats_without_rows_is_404() {
    let app = setup().await;

    let (status, body) = send_json(
        &app.router,
        get("/api/resource-usage/stats?startDate=2024-01-01&endDate=2024-01-02"),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No data found for the specified period");
}

#[tokio::test]
async fn test_list_paginates_newest_first() {
    let app = setup().await;
    for hour in 0..5 {
        app.store
            .insert(&sample(f64::from(hour), (1, 2), (1, 2), 1, hour))
            .await
            .unwrap();
    }

    let (status, body) =
        send_json(&app.router, get("/api/resource-usage?page=2&limit=2")).await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["cpu_usage"], 2.0);
    assert_eq!(data[1]["cpu_usage"], 1.0);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["limit"], 2);
    assert_eq!(body["pagination"]["total"], 5);
    assert_eq!(body["pagination"]["totalPages"], 3);
}

#[tokio::test]
async fn test_invalid_query_values_are_400() {
    let app = setup().await;

    for uri in [
        "/api/resource-usage?limit=abc",
        "/api/resource-usage?page=0",
        "/api/resource-usage?startDate=yesterday",
        "/api/resource-usage/stats?startDate=2024-01-03&endDate=2024-01-01",
    ] {
        let (status, body) = send_json(&app.router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn test_repeated_reads_are_byte_identical() {
    let app = setup().await;
    app.store
        .insert(&sample(42.0, (10, 20), (30, 40), 1, 3))
        .await
        .unwrap();

    let (_, first) = send(&app.router, get("/api/resource-usage?limit=10")).await;
    let (_, second) = send(&app.router, get("/api/resource-usage?limit=10")).await;
    assert_eq!(first, second);

    let (_, first) = send(&app.router, get("/api/resource-usage/latest")).await;
    let (_, second) = send(&app.router, get("/api/resource-usage/latest")).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_history_reports_window_meta() {
    let app = setup().await;

    let (status, body) = send_json(&app.router, get("/api/resource-usage/history")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["days"], 30);
    assert_eq!(body["meta"]["totalRecords"], 0);
    assert!(body["meta"]["startDate"]
        .as_str()
        .unwrap()
        .ends_with("T00:00:00.000Z"));
    assert!(body["meta"]["endDate"]
        .as_str()
        .unwrap()
        .ends_with("T23:59:59.999Z"));
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let app = setup().await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"], "ready");
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_health_degrades_when_queue_closed() {
    let app = setup().await;
    app.queue.close().await.unwrap();

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_health_reports_reconnecting_queue_without_waiting() {
    let queue = Arc::new(StalledQueue {
        state: ConnectionState::Reconnecting,
    });
    let router = create_routes(AppState::new(memory_store().await, queue, API_KEY));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = tokio::time::timeout(Duration::from_secs(1), send_json(&router, request))
        .await
        .expect("health check must not wait on a reconnecting queue");

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["queue"], "reconnecting");
    assert_eq!(body["store"], "ok");
}

#[tokio::test]
async fn test_health_bounds_stalled_queue_counts() {
    let queue = Arc::new(StalledQueue {
        state: ConnectionState::Ready,
    });
    let router = create_routes(AppState::new(memory_store().await, queue, API_KEY));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = tokio::time::timeout(Duration::from_secs(5), send_json(&router, request))
        .await
        .expect("health check must give up on stalled queue counts");

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert!(body["queue_counts"].is_null());
}

#[tokio::test]
async fn test_unknown_api_path_requires_key() {
    let app = setup().await;

    let request = Request::builder()
        .uri("/api/unknown")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, serde_json::json!({ "error": "API key is required" }));

    let (status, body) = send_json(&app.router, get("/api/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Not found");
}
