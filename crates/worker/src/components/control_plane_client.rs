use std::time::Duration;

use jobhub_core::{
    SchedulerError, SchedulerResult, WorkerErrorReport, WorkerRegistered, WorkerRegistration,
};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

/// 控制面HTTP客户端：注册、心跳与错误上报
pub struct ControlPlaneClient {
    control_plane_url: String,
    http_client: reqwest::Client,
}

impl ControlPlaneClient {
    pub fn new(control_plane_url: &str, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            control_plane_url: control_plane_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn control_plane_url(&self) -> &str {
        &self.control_plane_url
    }

    pub async fn register(&self, registration: &WorkerRegistration) -> SchedulerResult<String> {
        let url = format!("{}/api/workers/register", self.control_plane_url);

        match self.http_client.post(&url).json(registration).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let registered: WorkerRegistered = response.json().await.map_err(|e| {
                        SchedulerError::Serialization(format!("解析注册响应失败: {e}"))
                    })?;
                    info!(
                        "Worker {} 注册成功 (worker_id: {})",
                        registration.base_url, registered.worker_id
                    );
                    Ok(registered.worker_id)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!("Worker注册失败: HTTP {} - {}", status, body);
                    Err(Self::map_status(status, body))
                }
            }
            Err(e) => {
                warn!("连接控制面注册失败: {}", e);
                Err(SchedulerError::Network(format!("控制面连接错误: {e}")))
            }
        }
    }

    /// 发送心跳；控制面不认识该ID时返回 `WorkerNotFound`
    pub async fn heartbeat(&self, worker_id: &str) -> SchedulerResult<()> {
        let url = format!("{}/api/workers/{}/heartbeat", self.control_plane_url, worker_id);

        match self.http_client.post(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Worker {} 心跳发送成功", worker_id);
                    Ok(())
                } else if status == StatusCode::NOT_FOUND {
                    Err(SchedulerError::WorkerNotFound {
                        id: worker_id.to_string(),
                    })
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(Self::map_status(status, body))
                }
            }
            Err(e) => Err(SchedulerError::Network(format!("心跳连接错误: {e}"))),
        }
    }

    pub async fn report_error(&self, worker_id: &str, message: &str) -> SchedulerResult<()> {
        let url = format!("{}/api/workers/{}/error", self.control_plane_url, worker_id);
        let report = WorkerErrorReport {
            message: message.to_string(),
        };

        let response = self
            .http_client
            .post(&url)
            .json(&report)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("错误上报连接错误: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SchedulerError::WorkerNotFound {
                id: worker_id.to_string(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::map_status(status, body))
    }

    fn map_status(status: StatusCode, body: String) -> SchedulerError {
        let message = format!("控制面返回 HTTP {status}: {body}");
        if status.is_client_error() {
            SchedulerError::Validation(message)
        } else {
            SchedulerError::ExternalApi(message)
        }
    }
}
