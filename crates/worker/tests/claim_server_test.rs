use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use jobhub_core::{ClaimResponse, WorkerRegistration};
use jobhub_worker::{claim_routes, ClaimState, ControlPlaneClient, HeartbeatManager, WorkDistributor};
use serde_json::json;
use tower::ServiceExt;

/// 注册时总是分配 worker-a 的控制面
async fn spawn_control_plane() -> String {
    let app = Router::new().route(
        "/api/workers/register",
        post(|| async { Json(json!({"worker_id": "worker-a"})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn claim_state() -> ClaimState {
    let url = spawn_control_plane().await;
    let client = Arc::new(ControlPlaneClient::new(&url, Duration::from_secs(5)).unwrap());
    let heartbeat = Arc::new(HeartbeatManager::new(
        client,
        WorkerRegistration {
            base_url: "http://10.0.0.9:9000".to_string(),
            name: None,
            capacity: 2,
        },
        Duration::from_secs(30),
    ));
    ClaimState {
        distributor: Arc::new(WorkDistributor::new(10).unwrap()),
        heartbeat,
    }
}

fn claim_request(items: &[String]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/claims")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "items": items }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_claims_follow_registered_worker_id() {
    let state = claim_state().await;
    let items: Vec<String> = (0..20).map(|i| format!("media-{i}")).collect();
    let app = claim_routes(state.clone());

    let response = app.clone().oneshot(claim_request(&items)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.heartbeat.register().await.unwrap();

    let response = app.oneshot(claim_request(&items)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let claim: ClaimResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(claim.worker_id, "worker-a");
    assert_eq!(claim.bucket, 6);
    assert_eq!(claim.owned, vec!["media-1", "media-3", "media-4"]);
    assert_eq!(claim.skipped, 17);
}

#[tokio::test]
async fn test_claims_are_deterministic() {
    let state = claim_state().await;
    state.heartbeat.register().await.unwrap();
    let items = vec!["media-1".to_string(), "media-5".to_string()];
    let app = claim_routes(state);

    let mut seen = Vec::new();
    for _ in 0..2 {
        let response = app.clone().oneshot(claim_request(&items)).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let claim: ClaimResponse = serde_json::from_slice(&body).unwrap();
        seen.push(claim.owned);
    }
    assert_eq!(seen[0], vec!["media-1"]);
    assert_eq!(seen[0], seen[1]);
}
