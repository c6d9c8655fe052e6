use std::sync::Arc;
use std::time::Duration;

use jobhub_core::{SchedulerError, SchedulerResult, WorkerRegistration};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::ControlPlaneClient;

/// 心跳管理器
///
/// 首次心跳前注册；控制面返回404时重新注册并沿用新的ID。
pub struct HeartbeatManager {
    client: Arc<ControlPlaneClient>,
    registration: WorkerRegistration,
    heartbeat_interval: Duration,
    worker_id: RwLock<Option<String>>,
}

impl HeartbeatManager {
    pub fn new(
        client: Arc<ControlPlaneClient>,
        registration: WorkerRegistration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            client,
            registration,
            heartbeat_interval,
            worker_id: RwLock::new(None),
        }
    }

    pub async fn worker_id(&self) -> Option<String> {
        self.worker_id.read().await.clone()
    }

    pub async fn register(&self) -> SchedulerResult<String> {
        let worker_id = self.client.register(&self.registration).await?;
        *self.worker_id.write().await = Some(worker_id.clone());
        Ok(worker_id)
    }

    /// 执行一次心跳周期，返回当前有效的Worker ID
    pub async fn beat_once(&self) -> SchedulerResult<String> {
        let current = self.worker_id().await;
        let worker_id = match current {
            Some(id) => id,
            None => return self.register().await,
        };

        match self.client.heartbeat(&worker_id).await {
            Ok(()) => Ok(worker_id),
            Err(SchedulerError::WorkerNotFound { .. }) => {
                warn!("控制面不认识Worker {}，重新注册", worker_id);
                self.register().await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn report_error(&self, message: &str) -> SchedulerResult<()> {
        match self.worker_id().await {
            Some(worker_id) => self.client.report_error(&worker_id, message).await,
            None => Err(SchedulerError::Validation("Worker尚未注册".to_string())),
        }
    }

    pub fn start(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let mut ticker = interval(self.heartbeat_interval);

        tokio::spawn(async move {
            info!(
                "心跳任务启动，间隔 {:?}，控制面 {}",
                self.heartbeat_interval,
                self.client.control_plane_url()
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.beat_once().await {
                            error!("心跳失败: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Heartbeat task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
