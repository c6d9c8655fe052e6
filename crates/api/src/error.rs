use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jobhub_core::SchedulerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(err) => match err {
                SchedulerError::Validation(_) | SchedulerError::Serialization(_) => {
                    StatusCode::BAD_REQUEST
                }
                err if err.is_not_found() => StatusCode::NOT_FOUND,
                SchedulerError::LockConflict { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use jobhub_core::JobKind;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (ApiError::BadRequest("task_id".to_string()), StatusCode::BAD_REQUEST),
            (
                SchedulerError::Validation("bad".to_string()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                SchedulerError::JobNotFound { id: 9 }.into(),
                StatusCode::NOT_FOUND,
            ),
            (
                SchedulerError::WorkerNotFound { id: "w".to_string() }.into(),
                StatusCode::NOT_FOUND,
            ),
            (
                SchedulerError::lock_conflict(JobKind::BulkLogin, 42, "node-a").into(),
                StatusCode::CONFLICT,
            ),
            (
                SchedulerError::Internal("boom".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }

    #[test]
    fn test_conflict_detail_names_holder() {
        let error: ApiError = SchedulerError::lock_conflict(JobKind::BulkLogin, 42, "node-a").into();
        assert!(error.to_string().contains("node-a"));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }
}
