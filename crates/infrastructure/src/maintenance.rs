use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jobhub_core::{
    config::MaintenanceConfig,
    models::{SweepCriteria, SweepReport},
    traits::LockRepository,
    SchedulerError, SchedulerResult,
};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// 一次锁清理的参数
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// 只处理该持有者的锁
    pub worker_id: Option<String>,
    /// 额外清理超过 `max_age` 未续约的锁，即使尚未过期
    pub force: bool,
    /// 只报告候选，不做任何删除
    pub dry_run: bool,
    pub max_age: Duration,
    pub batch_size: u32,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            worker_id: None,
            force: false,
            dry_run: false,
            max_age: Duration::seconds(3600),
            batch_size: 100,
        }
    }
}

impl SweepOptions {
    pub fn criteria(&self, now: DateTime<Utc>) -> SweepCriteria {
        SweepCriteria {
            now,
            worker_id: self.worker_id.clone(),
            stale_before: self.force.then(|| {
                now.checked_sub_signed(self.max_age)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }),
        }
    }
}

/// 任务锁维护服务
///
/// 周期性删除已过期的租约，防止崩溃的持有者留下的锁记录无限增长。
/// 过期锁本身不阻塞新的获取，清理只影响报表与表大小。
pub struct LockMaintenanceService {
    lock_repository: Arc<dyn LockRepository>,
    config: MaintenanceConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    sweep_handle: Option<tokio::task::JoinHandle<()>>,
}

impl LockMaintenanceService {
    pub fn new(lock_repository: Arc<dyn LockRepository>, config: MaintenanceConfig) -> Self {
        Self {
            lock_repository,
            config,
            shutdown_tx: None,
            sweep_handle: None,
        }
    }

    /// 启动周期清理
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if !self.config.enabled {
            info!("Lock maintenance is disabled");
            return Ok(());
        }
        if self.sweep_handle.is_some() {
            return Err(SchedulerError::BusinessLogic(
                "锁维护服务已在运行".to_string(),
            ));
        }

        info!("Starting lock maintenance with config: {:?}", self.config);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let lock_repository = self.lock_repository.clone();
        let options = SweepOptions {
            batch_size: self.config.batch_size,
            ..SweepOptions::default()
        };
        let period = std::time::Duration::from_secs(self.config.sweep_interval_seconds);

        let handle = tokio::spawn(async move {
            let mut sweep_interval = interval(period);

            loop {
                tokio::select! {
                    _ = sweep_interval.tick() => {
                        if let Err(e) = Self::sweep(lock_repository.as_ref(), &options).await {
                            error!("Lock sweep failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Lock maintenance shutdown requested");
                        break;
                    }
                }
            }
        });

        self.sweep_handle = Some(handle);
        Ok(())
    }

    /// 停止周期清理
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.sweep_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for lock maintenance to stop: {}", e);
            }
        }

        info!("Lock maintenance stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sweep_handle.is_some()
    }

    /// 执行一次清理
    pub async fn run_once(&self, options: &SweepOptions) -> SchedulerResult<SweepReport> {
        Self::sweep(self.lock_repository.as_ref(), options).await
    }

    async fn sweep(
        lock_repository: &dyn LockRepository,
        options: &SweepOptions,
    ) -> SchedulerResult<SweepReport> {
        if options.batch_size == 0 {
            return Err(SchedulerError::Validation(
                "批次大小必须大于0".to_string(),
            ));
        }

        let start_time = std::time::Instant::now();
        let criteria = options.criteria(Utc::now());
        let mut report = SweepReport {
            dry_run: options.dry_run,
            ..SweepReport::default()
        };
        let mut after_id = None;

        loop {
            let batch = lock_repository
                .find_sweep_candidates(&criteria, after_id, options.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            report.batches += 1;
            after_id = batch.last().map(|lock| lock.id);
            let is_full = batch.len() >= options.batch_size as usize;

            if !options.dry_run {
                let ids: Vec<i64> = batch.iter().map(|lock| lock.id).collect();
                let deleted = lock_repository.delete_candidates(&criteria, &ids).await?;
                if deleted < ids.len() as u64 {
                    debug!(
                        "{} locks were renewed before deletion",
                        ids.len() as u64 - deleted
                    );
                }
                report.deleted += deleted;
            }

            report.candidates.extend(batch);
            if !is_full {
                break;
            }
        }

        if report.deleted > 0 {
            metrics::counter!("jobhub_locks_swept_total").increment(report.deleted);
        }

        info!(
            candidates = report.candidate_count(),
            deleted = report.deleted,
            batches = report.batches,
            dry_run = report.dry_run,
            force = options.force,
            "Lock sweep completed in {:?}",
            start_time.elapsed()
        );

        Ok(report)
    }
}
