use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use jobhub_core::{JobKind, JobSnapshot, OrchestratorMetrics, StartOptions, StartResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub task_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub job_id: i64,
    pub stopped: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub job_id: i64,
    pub deleted: bool,
}

pub(crate) fn job_id_from(path: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(format!("作业ID无效: {e}")))
}

/// 启动作业：`POST /api/{kind}/start?task_id=<id>`，请求体可选
pub async fn start_job(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    query: Result<Query<StartQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<StartResponse>> {
    let kind: JobKind = kind.parse()?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let task_id = query
        .task_id
        .ok_or_else(|| ApiError::BadRequest("缺少参数 task_id".to_string()))?;

    let options = if body.iter().all(u8::is_ascii_whitespace) {
        StartOptions::default()
    } else {
        serde_json::from_slice::<StartOptions>(&body)
            .map_err(|e| ApiError::BadRequest(format!("启动参数格式错误: {e}")))?
    };

    let response = state.orchestrator.start(kind, task_id, options).await?;
    info!(
        "通过API启动作业 {} ({}/{})",
        response.job_id, kind, task_id
    );
    Ok(Json(response))
}

pub async fn stop_job(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<StopResponse>> {
    let job_id = job_id_from(path)?;
    let stopped = state.orchestrator.stop_job(job_id).await?;
    Ok(Json(StopResponse { job_id, stopped }))
}

pub async fn delete_job(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<DeleteResponse>> {
    let job_id = job_id_from(path)?;
    let deleted = state.orchestrator.delete_job(job_id).await?;
    Ok(Json(DeleteResponse { job_id, deleted }))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.orchestrator.list_jobs().await)
}

pub async fn get_job_status(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<JobSnapshot>> {
    let job_id = job_id_from(path)?;
    Ok(Json(state.orchestrator.get_status(job_id).await?))
}

pub async fn get_metrics(State(state): State<AppState>) -> Json<OrchestratorMetrics> {
    Json(state.orchestrator.get_metrics().await)
}
