use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobhub_core::{ClaimRequest, ClaimResponse};
use serde_json::json;
use tracing::debug;

use super::HeartbeatManager;
use crate::distributor::WorkDistributor;

/// Worker本地的素材认领接口
///
/// 只凭本Worker在控制面登记的ID和素材ID判断归属，不访问控制面。
#[derive(Clone)]
pub struct ClaimState {
    pub distributor: Arc<WorkDistributor>,
    pub heartbeat: Arc<HeartbeatManager>,
}

pub fn claim_routes(state: ClaimState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/claims", post(claim))
        .with_state(state)
}

async fn health(State(state): State<ClaimState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "worker_id": state.heartbeat.worker_id().await,
    }))
}

async fn claim(State(state): State<ClaimState>, Json(request): Json<ClaimRequest>) -> Response {
    let Some(worker_id) = state.heartbeat.worker_id().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "Worker尚未注册"})),
        )
            .into_response();
    };

    let owned: Vec<String> = state
        .distributor
        .owned_items(&request.items, &worker_id)
        .into_iter()
        .cloned()
        .collect();
    debug!(
        "认领素材: {}/{} (Worker: {})",
        owned.len(),
        request.items.len(),
        worker_id
    );

    Json(ClaimResponse {
        bucket: state.distributor.bucket_of(&worker_id),
        skipped: request.items.len() - owned.len(),
        owned,
        worker_id,
    })
    .into_response()
}
