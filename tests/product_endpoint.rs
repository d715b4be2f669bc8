//! End-to-end runs against an in-process product endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use cntryl_load::{
    LoadConfig, LoadResult, LoadRunner, Payload, ProductRequest, Schedule, Stage, Thresholds,
    TransportErrorKind,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Server {
    accepted: Arc<AtomicU64>,
    status: Option<StatusCode>,
    delay: Option<Duration>,
}

async fn create_product(
    State(server): State<Server>,
    Json(product): Json<ProductRequest>,
) -> StatusCode {
    if let Some(delay) = server.delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(status) = server.status {
        return status;
    }
    if product.name.is_empty() || product.price < 0.0 {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }
    server.accepted.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn spawn(server: Server) -> SocketAddr {
    let app = Router::new()
        .route("/product", post(create_product))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr, output_dir: &std::path::Path) -> LoadConfig {
    LoadConfig::new()
        .url(format!("http://{}/product", addr))
        .schedule(Schedule::new(1, vec![Stage::new(Duration::from_millis(800), 5)]))
        .graceful_stop(Duration::from_secs(5))
        .progress_interval(Duration::ZERO)
        .output_dir(output_dir)
        .verbose(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_post_sample_product_and_pass_status_check() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::default();
    let accepted = Arc::clone(&server.accepted);
    let addr = spawn(server).await;

    let cfg = config(addr, dir.path()).thresholds(
        Thresholds::default()
            .max_failure_rate(0.0)
            .min_check_rate(1.0),
    );
    let result = LoadRunner::new(cfg).unwrap().run().await.unwrap();

    let m = &result.metrics;
    assert!(m.http_reqs > 0);
    assert_eq!(m.http_req_failed, 0);
    assert_eq!(m.iterations, m.http_reqs);
    assert_eq!(m.checks["is status 200"].passes, m.http_reqs);
    assert_eq!(m.status_codes.get(&200), Some(&m.http_reqs));
    assert_eq!(accepted.load(Ordering::SeqCst), m.http_reqs);
    assert!(m.vus_max >= 1 && m.vus_max <= 5);
    assert!(m.latency.min <= m.latency.p95 && m.latency.p95 <= m.latency.max);
    assert!(result.passed());

    let expected_body = serde_json::to_vec(&ProductRequest::sample()).unwrap().len() as u64;
    assert_eq!(m.data_sent, expected_body * m.http_reqs);

    let saved = LoadResult::load(dir.path().join("product").join("latest.json")).unwrap();
    assert_eq!(saved.metrics.http_reqs, m.http_reqs);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_fail_checks_and_thresholds_on_server_errors() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(Server {
        status: Some(StatusCode::SERVICE_UNAVAILABLE),
        ..Server::default()
    })
    .await;

    let cfg = config(addr, dir.path()).thresholds(Thresholds::default().min_check_rate(0.99));
    let result = LoadRunner::new(cfg).unwrap().run().await.unwrap();

    let m = &result.metrics;
    assert!(m.http_reqs > 0);
    assert_eq!(m.checks["is status 200"].passes, 0);
    assert_eq!(m.failure_rate, 1.0);
    assert_eq!(m.status_codes.get(&503), Some(&m.http_reqs));
    assert_eq!(result.threshold_breaches.len(), 1);
    assert_eq!(result.threshold_breaches[0].metric, "checks");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_send_valid_random_products() {
    let dir = tempfile::tempdir().unwrap();
    let server = Server::default();
    let accepted = Arc::clone(&server.accepted);
    let addr = spawn(server).await;

    let cfg = config(addr, dir.path()).payload(Payload::RandomProduct);
    let result = LoadRunner::new(cfg).unwrap().run().await.unwrap();

    assert!(result.metrics.http_reqs > 0);
    assert_eq!(accepted.load(Ordering::SeqCst), result.metrics.http_reqs);
    assert_eq!(result.metrics.check_rate, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn should_classify_slow_responses_as_timeouts() {
    let dir = tempfile::tempdir().unwrap();
    let addr = spawn(Server {
        delay: Some(Duration::from_millis(500)),
        ..Server::default()
    })
    .await;

    let cfg = config(addr, dir.path())
        .schedule(Schedule::new(2, vec![Stage::new(Duration::from_millis(300), 2)]))
        .timeout(Duration::from_millis(50));
    let result = LoadRunner::new(cfg).unwrap().run().await.unwrap();

    let m = &result.metrics;
    assert!(m.http_reqs > 0);
    assert_eq!(m.transport_errors.get(&TransportErrorKind::Timeout), Some(&m.http_reqs));
    assert!(m.checks.is_empty());
    assert_eq!(m.failure_rate, 1.0);
}
