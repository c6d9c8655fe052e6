use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use jobhub_core::{JobKind, Lock, LockFilter};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LockQueryParams {
    pub kind: Option<String>,
    pub worker_id: Option<String>,
    #[serde(default)]
    pub expired_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub expired: usize,
    pub locks: Vec<Lock>,
}

pub async fn list_locks(
    State(state): State<AppState>,
    query: Result<Query<LockQueryParams>, QueryRejection>,
) -> ApiResult<Json<LockReport>> {
    let Query(params) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let kind = params
        .kind
        .as_deref()
        .map(str::parse::<JobKind>)
        .transpose()?;
    let filter = LockFilter {
        kind,
        worker_id: params.worker_id,
        expired_only: params.expired_only,
    };

    let locks = state.lock_repo.list(&filter).await?;
    let now = Utc::now();
    let expired = locks.iter().filter(|lock| lock.is_expired_at(now)).count();

    Ok(Json(LockReport {
        generated_at: now,
        total: locks.len(),
        expired,
        locks,
    }))
}
