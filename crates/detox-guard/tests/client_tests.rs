//! Analysis client against an in-process mock backend

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use detox_guard::config::{ClientConfig, ServersConfig};
use detox_guard::profile::ProfileRegistry;
use detox_guard::{
    AnalysisClient, DetoxService, Request, Response, ServerMode, HOSTED_UNAVAILABLE, RATE_LIMITED,
    TIMEOUT,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
enum Behavior {
    Detections,
    RateLimited,
    Slow(u64),
    Broken,
}

#[derive(Clone)]
struct Backend {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
}

async fn analyze(State(backend): State<Backend>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    assert!(body["image"].as_str().unwrap_or_default().starts_with("data:image/"));

    match backend.behavior {
        Behavior::Detections => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "detections": [
                    {"type": "email", "text": "jo@example.com", "bbox": {"x": 10, "y": 12, "width": 80, "height": 14}},
                    {"type": "phone", "text": "555-0100", "bbox": {"x": 10, "y": 40, "width": 60, "height": 14}}
                ],
                "scale": 2.0
            })),
        ),
        Behavior::RateLimited => (StatusCode::TOO_MANY_REQUESTS, Json(json!({"detail": "slow down"}))),
        Behavior::Slow(ms) => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            (StatusCode::OK, Json(json!({"success": true, "detections": [], "scale": 1.0})))
        }
        Behavior::Broken => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "boom"}))),
    }
}

async fn privacy() -> Json<Value> {
    Json(json!({
        "data_collection": {"images": "Processed in memory only", "ocr_results": "Not stored"},
        "data_retention": "None",
        "encryption": "TLS 1.3"
    }))
}

/// Serve a mock backend on an ephemeral port and return its base URL
async fn spawn_backend(behavior: Behavior) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(|| async { "ok" }))
        .route("/privacy", get(privacy))
        .with_state(Backend {
            behavior,
            hits: hits.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), hits)
}

fn client(local: &str, hosted: &str, timeout_ms: u64) -> AnalysisClient {
    let servers = ServersConfig {
        local: local.to_string(),
        hosted: hosted.to_string(),
        default_mode: ServerMode::Local,
    };
    AnalysisClient::new(
        ClientConfig {
            timeout_ms,
            health_timeout_ms: 500,
            ..Default::default()
        },
        Arc::new(ProfileRegistry::new(servers)),
    )
}

const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

#[tokio::test]
async fn test_analyze_returns_detections_and_scale() {
    let (url, hits) = spawn_backend(Behavior::Detections).await;
    let client = client(&url, &url, 5_000);

    let result = client.analyze(IMAGE).await;
    assert!(result.success);
    assert_eq!(result.scale, 2.0);
    assert_eq!(result.detections.len(), 2);
    assert_eq!(result.detections[0].kind, "email");
    assert_eq!(result.detections[1].text, "555-0100");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_is_a_soft_failure() {
    let (url, hits) = spawn_backend(Behavior::RateLimited).await;
    let client = client(&url, &url, 5_000);

    let result = client.analyze(IMAGE).await;
    assert!(!result.success);
    assert!(result.detections.is_empty());
    assert_eq!(result.error.as_deref(), Some(RATE_LIMITED));
    // no retry
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rate_limit_on_hosted_keeps_its_message() {
    let (url, _) = spawn_backend(Behavior::RateLimited).await;
    let client = client("http://127.0.0.1:1", &url, 5_000);
    client.profiles().set_mode(ServerMode::Hosted).await.unwrap();

    let result = client.analyze(IMAGE).await;
    assert_eq!(result.error.as_deref(), Some(RATE_LIMITED));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (url, _) = spawn_backend(Behavior::Slow(5_000)).await;
    let client = client(&url, &url, 200);

    let start = Instant::now();
    let result = client.analyze(IMAGE).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(TIMEOUT));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_server_error_local_vs_hosted() {
    let (url, _) = spawn_backend(Behavior::Broken).await;
    let client = client(&url, &url, 5_000);

    let local = client.analyze(IMAGE).await;
    assert!(!local.success);
    assert!(local.error.as_deref().unwrap().contains("500"));

    client.profiles().set_mode(ServerMode::Hosted).await.unwrap();
    let hosted = client.analyze(IMAGE).await;
    assert_eq!(hosted.error.as_deref(), Some(HOSTED_UNAVAILABLE));
}

#[tokio::test]
async fn test_health_and_privacy() {
    let (url, _) = spawn_backend(Behavior::Detections).await;
    let client = client(&url, "http://127.0.0.1:1", 5_000);

    assert!(client.health_active().await);

    let policy = client.privacy_policy().await.unwrap();
    assert_eq!(policy.data_collection.ocr_results, "Not stored");
    assert_eq!(policy.encryption, "TLS 1.3");

    client.profiles().set_mode(ServerMode::Hosted).await.unwrap();
    assert!(!client.health_active().await);
}

#[tokio::test]
async fn test_mode_switch_does_not_touch_in_flight_request() {
    let (slow_url, slow_hits) = spawn_backend(Behavior::Slow(300)).await;
    let (fast_url, fast_hits) = spawn_backend(Behavior::Detections).await;
    let client = Arc::new(client(&slow_url, &fast_url, 5_000));

    let in_flight = {
        let client = client.clone();
        tokio::spawn(async move { client.analyze(IMAGE).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.profiles().set_mode(ServerMode::Hosted).await.unwrap();

    let first = in_flight.await.unwrap();
    assert!(first.success);
    assert!(first.detections.is_empty());
    assert_eq!(slow_hits.load(Ordering::SeqCst), 1);

    let second = client.analyze(IMAGE).await;
    assert_eq!(second.detections.len(), 2);
    assert_eq!(fast_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_service_round_trip() {
    let (url, _) = spawn_backend(Behavior::Detections).await;
    let service = DetoxService::builder()
        .with_local_url(url.clone())
        .with_hosted_url("http://127.0.0.1:1")
        .build();
    service.start().await.unwrap();

    match service.handle(Request::CheckApi).await {
        Response::ApiStatus {
            available,
            mode,
            url: reported,
        } => {
            assert!(available);
            assert_eq!(mode, ServerMode::Local);
            assert_eq!(reported, url);
        }
        other => panic!("unexpected reply: {:?}", other),
    }

    let reply = service
        .handle(Request::AnalyzeImage {
            image: IMAGE.to_string(),
        })
        .await;
    assert_eq!(reply.into_analysis().unwrap().detections.len(), 2);

    let policy = service.handle(Request::GetPrivacyPolicy).await;
    let value = serde_json::to_value(policy).unwrap();
    assert_eq!(value["data_retention"], "None");
}
