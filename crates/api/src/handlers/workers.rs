use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use jobhub_core::{WorkerAck, WorkerErrorReport, WorkerNode, WorkerRegistered, WorkerRegistration};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct WorkerQueryParams {
    pub min_capacity: Option<i32>,
}

pub async fn register_worker(
    State(state): State<AppState>,
    payload: Result<Json<WorkerRegistration>, JsonRejection>,
) -> ApiResult<Json<WorkerRegistered>> {
    let Json(registration) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let worker_id = state.worker_repo.register(&registration).await?;
    info!("Worker注册: {} -> {}", registration.base_url, worker_id);
    Ok(Json(WorkerRegistered { worker_id }))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
) -> ApiResult<Json<WorkerAck>> {
    state.worker_repo.heartbeat(&worker_id).await?;
    Ok(Json(WorkerAck {
        worker_id,
        ok: true,
    }))
}

pub async fn report_error(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    payload: Result<Json<WorkerErrorReport>, JsonRejection>,
) -> ApiResult<Json<WorkerAck>> {
    let Json(report) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .worker_repo
        .report_error(&worker_id, &report.message)
        .await?;
    Ok(Json(WorkerAck {
        worker_id,
        ok: true,
    }))
}

/// 可参与调度的Worker：活跃、容量达标且心跳未过期
pub async fn list_workers(
    State(state): State<AppState>,
    query: Result<Query<WorkerQueryParams>, QueryRejection>,
) -> ApiResult<Json<Vec<WorkerNode>>> {
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let min_capacity = params.min_capacity.unwrap_or(state.min_worker_capacity);
    let workers = state
        .worker_repo
        .list_active(min_capacity, state.heartbeat_staleness)
        .await?;
    Ok(Json(workers))
}
