use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use jobhub_core::{LockRepository, WorkerRepository};
use jobhub_dispatcher::JobOrchestrator;

use crate::handlers::{
    health::health_check,
    jobs::{delete_job, get_job_status, get_metrics, list_jobs, start_job, stop_job},
    locks::list_locks,
    workers::{heartbeat, list_workers, register_worker, report_error},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    pub lock_repo: Arc<dyn LockRepository>,
    pub worker_repo: Arc<dyn WorkerRepository>,
    pub heartbeat_staleness: chrono::Duration,
    pub min_worker_capacity: i32,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 作业管理API
        .route("/api/{kind}/start", post(start_job))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", axum::routing::delete(delete_job))
        .route("/api/jobs/{id}/stop", post(stop_job))
        .route("/api/jobs/{id}/status", get(get_job_status))
        .route("/api/metrics", get(get_metrics))
        // Worker管理API
        .route("/api/workers", get(list_workers))
        .route("/api/workers/register", post(register_worker))
        .route("/api/workers/{id}/heartbeat", post(heartbeat))
        .route("/api/workers/{id}/error", post(report_error))
        // 任务锁
        .route("/api/locks", get(list_locks))
        .with_state(state)
}
