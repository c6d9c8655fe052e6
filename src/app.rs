use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use jobhub_api::{create_app, AppState};
use jobhub_core::AppConfig;
use jobhub_dispatcher::{HttpJobExecutor, JobOrchestrator};
use jobhub_infrastructure::{DatabaseManager, LockMaintenanceService};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::{net::TcpListener, sync::broadcast, sync::Mutex};
use tracing::{error, info, warn};

/// 控制面进程：HTTP接口、作业编排与锁维护
pub struct Application {
    config: AppConfig,
    db: DatabaseManager,
    orchestrator: JobOrchestrator,
    maintenance: Mutex<LockMaintenanceService>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let db = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        db.migrate().await.context("执行数据库迁移失败")?;

        let metrics_handle = if config.observability.metrics_enabled {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("安装Prometheus指标记录器失败")?;
            Some(handle)
        } else {
            None
        };

        Self::build(config, db, metrics_handle)
    }

    /// 用已有的数据库组装应用，不安装全局指标记录器
    pub fn build(
        config: AppConfig,
        db: DatabaseManager,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let node_id = resolve_node_id(&config.orchestrator.node_id);
        let executor = HttpJobExecutor::new(config.orchestrator.executor_timeout())
            .context("创建作业执行器失败")?;

        let orchestrator = JobOrchestrator::builder(
            db.lock_repository(),
            db.worker_repository(),
            Arc::new(executor),
        )
        .node_id(node_id)
        .orchestrator_config(config.orchestrator.clone())
        .registry_config(config.registry.clone())
        .concurrency_config(config.concurrency.clone())
        .retry_config(config.retry.clone())
        .build();

        let maintenance =
            LockMaintenanceService::new(db.lock_repository(), config.maintenance.clone());

        info!("编排节点: {}", orchestrator.node_id());
        Ok(Self {
            config,
            db,
            orchestrator,
            maintenance: Mutex::new(maintenance),
            metrics_handle,
        })
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    /// 完整的HTTP路由，指标端点启用时一并挂载
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            lock_repo: self.db.lock_repository(),
            worker_repo: self.db.worker_repository(),
            heartbeat_staleness: self.config.registry.staleness(),
            min_worker_capacity: self.config.orchestrator.min_worker_capacity,
        };
        let router = create_app(state, &self.config.api);

        match &self.metrics_handle {
            Some(handle) => {
                let handle = handle.clone();
                router.route(
                    &self.config.observability.metrics_endpoint,
                    get(move || async move { handle.render() }),
                )
            }
            None => router,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.maintenance.enabled {
            self.maintenance
                .lock()
                .await
                .start()
                .await
                .context("启动锁维护服务失败")?;
        }

        let serve_result = if self.config.api.enabled {
            self.serve(shutdown_rx).await
        } else {
            info!("API服务未启用，仅运行后台维护");
            let _ = shutdown_rx.recv().await;
            Ok(())
        };

        let stopped = self
            .orchestrator
            .shutdown(self.config.orchestrator.shutdown_timeout())
            .await;
        if stopped > 0 {
            info!("已停止 {} 个运行中的作业", stopped);
        }

        let mut maintenance = self.maintenance.lock().await;
        if maintenance.is_running() {
            if let Err(e) = maintenance.stop().await {
                warn!("停止锁维护服务失败: {e}");
            }
        }
        self.db.close().await;

        serve_result
    }

    async fn serve(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定API地址失败: {bind_address}"))?;
        info!("API服务器监听: {}", bind_address);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await;
        if let Err(e) = &result {
            error!("API服务器异常退出: {e}");
        }
        result.context("API服务器运行失败")
    }
}

/// 配置为空时使用 主机名-进程号
pub fn resolve_node_id(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{host}-{}", std::process::id())
}
