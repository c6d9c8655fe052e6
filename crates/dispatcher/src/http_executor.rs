use std::time::Duration;

use async_trait::async_trait;
use jobhub_core::{
    models::WorkerNode,
    traits::{JobExecutor, WorkUnit},
    SchedulerError, SchedulerResult,
};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// 通过HTTP把执行单元交给Worker：`POST {base_url}/jobs/{kind}`
#[derive(Clone)]
pub struct HttpJobExecutor {
    client: Client,
}

impl HttpJobExecutor {
    pub fn new(timeout: Duration) -> SchedulerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn map_status(status: StatusCode, body: String) -> SchedulerError {
        let message = format!("Worker返回 {status}: {body}");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SchedulerError::Authentication(message)
            }
            status if status.is_client_error() => SchedulerError::Validation(message),
            _ => SchedulerError::ExternalApi(message),
        }
    }
}

#[async_trait]
impl JobExecutor for HttpJobExecutor {
    async fn execute(
        &self,
        worker: &WorkerNode,
        unit: &WorkUnit,
    ) -> SchedulerResult<serde_json::Value> {
        let url = format!(
            "{}/jobs/{}",
            worker.base_url.trim_end_matches('/'),
            unit.kind
        );
        debug!(
            job_id = unit.job_id,
            attempt = unit.attempt,
            "派发执行单元到 {}",
            url
        );

        let response = self
            .client
            .post(&url)
            .header("X-Request-Id", &unit.request_id)
            .json(unit)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("请求Worker失败 {url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SchedulerError::Network(format!("读取Worker响应失败: {e}")))?;

        if !status.is_success() {
            return Err(Self::map_status(status, body));
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| SchedulerError::ExternalApi(format!("Worker响应不是合法JSON: {e}")))
    }
}
