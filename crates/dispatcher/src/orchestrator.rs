//! 作业编排器
//!
//! 作业生命周期：
//!
//! ```text
//! PENDING --派发成功--> RUNNING --全部成功--> COMPLETED
//!    |                     |------全部失败--> FAILED
//!    |                     |------部分失败--> PARTIALLY_COMPLETED
//!    |                     `------停止------> FAILED
//!    `--没有可用Worker--> FAILED
//! ```
//!
//! 启动作业前先以本节点标识获取任务锁；运行期间按租约的三分之一周期续约，
//! 续约失败视为失去租约并触发停止。无论以何种方式结束，任务锁都会被释放。

use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use jobhub_core::{
    config::{ConcurrencyConfig, OrchestratorConfig, RegistryConfig, RetryConfig},
    models::{
        ErrorCategory, ErrorContext, JobKind, JobMetrics, JobSnapshot, JobStatus, Lock,
        OrchestratorMetrics, RetryEvent, StartOptions, StartResponse, UnitError, WorkerNode,
    },
    traits::{JobExecutor, LockRepository, WorkUnit, WorkerRepository},
    SchedulerError, SchedulerResult,
};
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::concurrency::ConcurrencyLimiter;
use crate::error_classifier::ErrorClassifier;
use crate::retry_policy::{AuthRetryPolicy, RetryDecider, RetryPolicy};
use crate::strategies::{FirstAvailableStrategy, WorkerSelectionStrategy};

/// 可等待的停止信号
#[derive(Default)]
struct StopSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// 可被停止打断的等待，完整等待返回 `true`
    async fn sleep(&self, delay: Duration) -> bool {
        if self.is_set() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_set(),
            _ = self.wait() => false,
        }
    }
}

struct JobEntry {
    state: Mutex<JobSnapshot>,
    stop: StopSignal,
    finished: StopSignal,
}

impl JobEntry {
    async fn snapshot(&self) -> JobSnapshot {
        self.state.lock().await.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

struct Inner {
    node_id: String,
    config: OrchestratorConfig,
    staleness: chrono::Duration,
    lock_repository: Arc<dyn LockRepository>,
    worker_repository: Arc<dyn WorkerRepository>,
    executor: Arc<dyn JobExecutor>,
    limiter: Arc<ConcurrencyLimiter>,
    classifier: ErrorClassifier,
    standard_policy: Arc<dyn RetryDecider>,
    auth_policy: Arc<dyn RetryDecider>,
    strategy: Arc<dyn WorkerSelectionStrategy>,
    jobs: RwLock<HashMap<i64, Arc<JobEntry>>>,
    active_keys: Mutex<HashSet<(JobKind, i64)>>,
    next_job_id: AtomicI64,
}

/// 作业编排器构建器
pub struct JobOrchestratorBuilder {
    lock_repository: Arc<dyn LockRepository>,
    worker_repository: Arc<dyn WorkerRepository>,
    executor: Arc<dyn JobExecutor>,
    node_id: Option<String>,
    config: OrchestratorConfig,
    registry: RegistryConfig,
    concurrency: ConcurrencyConfig,
    retry: RetryConfig,
    limiter: Option<Arc<ConcurrencyLimiter>>,
    standard_policy: Option<Arc<dyn RetryDecider>>,
    auth_policy: Option<Arc<dyn RetryDecider>>,
    strategy: Option<Arc<dyn WorkerSelectionStrategy>>,
}

impl JobOrchestratorBuilder {
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    pub fn concurrency_config(mut self, config: ConcurrencyConfig) -> Self {
        self.concurrency = config;
        self
    }

    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn standard_policy(mut self, policy: Arc<dyn RetryDecider>) -> Self {
        self.standard_policy = Some(policy);
        self
    }

    pub fn auth_policy(mut self, policy: Arc<dyn RetryDecider>) -> Self {
        self.auth_policy = Some(policy);
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn WorkerSelectionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn build(self) -> JobOrchestrator {
        let node_id = self
            .node_id
            .filter(|id| !id.is_empty())
            .or_else(|| Some(self.config.node_id.clone()).filter(|id| !id.is_empty()))
            .unwrap_or_else(|| format!("orchestrator-{}", std::process::id()));

        let inner = Inner {
            node_id,
            staleness: self.registry.staleness(),
            lock_repository: self.lock_repository,
            worker_repository: self.worker_repository,
            executor: self.executor,
            limiter: self
                .limiter
                .unwrap_or_else(|| Arc::new(ConcurrencyLimiter::new(&self.concurrency))),
            classifier: ErrorClassifier::new(),
            standard_policy: self
                .standard_policy
                .unwrap_or_else(|| Arc::new(RetryPolicy::from_config(&self.retry))),
            auth_policy: self
                .auth_policy
                .unwrap_or_else(|| Arc::new(AuthRetryPolicy::from_config(&self.retry.auth))),
            strategy: self
                .strategy
                .unwrap_or_else(|| Arc::new(FirstAvailableStrategy)),
            config: self.config,
            jobs: RwLock::new(HashMap::new()),
            active_keys: Mutex::new(HashSet::new()),
            next_job_id: AtomicI64::new(1),
        };

        JobOrchestrator {
            inner: Arc::new(inner),
        }
    }
}

/// 作业编排器
///
/// 作业状态只保存在内存中，由编排器独占管理；任务锁保存在数据库中，
/// 是跨进程判断"谁可以运行这个任务"的唯一依据。
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn builder(
        lock_repository: Arc<dyn LockRepository>,
        worker_repository: Arc<dyn WorkerRepository>,
        executor: Arc<dyn JobExecutor>,
    ) -> JobOrchestratorBuilder {
        JobOrchestratorBuilder {
            lock_repository,
            worker_repository,
            executor,
            node_id: None,
            config: OrchestratorConfig::default(),
            registry: RegistryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            limiter: None,
            standard_policy: None,
            auth_policy: None,
            strategy: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.inner.limiter
    }

    /// 启动作业
    ///
    /// 任务锁被其他持有者占用，或本节点上同一任务已有运行中的作业时返回 `LockConflict`。
    pub async fn start(
        &self,
        kind: JobKind,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        let inner = &self.inner;
        if task_id < 0 {
            return Err(SchedulerError::Validation(format!(
                "任务ID不能为负数: {task_id}"
            )));
        }
        let lease = match options.lease_seconds {
            Some(0) => {
                return Err(SchedulerError::Validation("租约时长必须大于0".to_string()))
            }
            Some(seconds) => Duration::from_secs(seconds),
            None => inner.config.lease_for(kind),
        };
        let chrono_lease = chrono::Duration::from_std(lease)
            .map_err(|e| SchedulerError::Validation(format!("租约时长无效: {e}")))?;

        {
            let mut active_keys = inner.active_keys.lock().await;
            if !active_keys.insert((kind, task_id)) {
                return Err(SchedulerError::lock_conflict(
                    kind,
                    task_id,
                    inner.node_id.clone(),
                ));
            }
        }

        let lock = match inner
            .lock_repository
            .acquire(kind, task_id, &inner.node_id, chrono_lease)
            .await
        {
            Ok(lock) => lock,
            Err(e) => {
                inner.active_keys.lock().await.remove(&(kind, task_id));
                if matches!(e, SchedulerError::LockConflict { .. }) {
                    metrics::counter!("jobhub_lock_conflicts_total", "kind" => kind.as_str())
                        .increment(1);
                }
                return Err(e);
            }
        };

        let job_id = inner.next_job_id.fetch_add(1, Ordering::SeqCst);
        let units_total = options.account_ids.len().max(1);
        let snapshot = JobSnapshot {
            id: job_id,
            kind,
            task_id,
            status: JobStatus::Pending,
            worker_id: None,
            lock_id: lock.id,
            request_id: Uuid::new_v4().to_string(),
            stop_requested: false,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            metrics: JobMetrics {
                units_total,
                ..JobMetrics::default()
            },
        };
        let entry = Arc::new(JobEntry {
            state: Mutex::new(snapshot),
            stop: StopSignal::default(),
            finished: StopSignal::default(),
        });
        inner.jobs.write().await.insert(job_id, entry.clone());

        metrics::counter!("jobhub_jobs_started_total", "kind" => kind.as_str()).increment(1);
        metrics::gauge!("jobhub_jobs_active").increment(1.0);
        info!(
            job_id,
            task_id,
            lock_id = lock.id,
            units = units_total,
            "作业已创建: {}",
            kind
        );

        let runner = self.inner.clone();
        tokio::spawn(async move {
            runner.run_job(entry, lock, options, lease).await;
        });

        Ok(StartResponse {
            job_id,
            accepted: true,
        })
    }

    pub async fn start_bulk_login(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::BulkLogin, task_id, options).await
    }

    pub async fn start_warmup(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::Warmup, task_id, options).await
    }

    pub async fn start_avatar(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::Avatar, task_id, options).await
    }

    pub async fn start_bio(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::Bio, task_id, options).await
    }

    pub async fn start_follow(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::Follow, task_id, options).await
    }

    pub async fn start_proxy_diagnostics(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::ProxyDiagnostics, task_id, options).await
    }

    pub async fn start_media_dedup(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::MediaDedup, task_id, options).await
    }

    pub async fn start_cookie_robot(
        &self,
        task_id: i64,
        options: StartOptions,
    ) -> SchedulerResult<StartResponse> {
        self.start(JobKind::CookieRobot, task_id, options).await
    }

    /// 请求停止作业
    ///
    /// 停止是协作式的：在开始下一个账号之前、下一次重试之前生效。
    /// 作业已结束时返回 `false`。
    pub async fn stop_job(&self, job_id: i64) -> SchedulerResult<bool> {
        let entry = self.entry(job_id).await?;
        {
            let mut state = entry.state.lock().await;
            if state.status.is_terminal() {
                return Ok(false);
            }
            state.stop_requested = true;
        }
        entry.stop.trigger();
        info!(job_id, "作业停止请求已发出");
        Ok(true)
    }

    /// 删除已结束的作业记录，运行中的作业不能删除
    pub async fn delete_job(&self, job_id: i64) -> SchedulerResult<bool> {
        let mut jobs = self.inner.jobs.write().await;
        let entry = jobs
            .get(&job_id)
            .cloned()
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;
        if entry.state.lock().await.status.is_active() {
            debug!(job_id, "作业仍在运行，拒绝删除");
            return Ok(false);
        }
        jobs.remove(&job_id);
        Ok(true)
    }

    pub async fn get_status(&self, job_id: i64) -> SchedulerResult<JobSnapshot> {
        Ok(self.entry(job_id).await?.snapshot().await)
    }

    pub async fn list_jobs(&self) -> Vec<JobSnapshot> {
        let entries: Vec<Arc<JobEntry>> = self.inner.jobs.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.snapshot().await);
        }
        snapshots.sort_by_key(|job| job.id);
        snapshots
    }

    pub async fn get_metrics(&self) -> OrchestratorMetrics {
        let mut metrics = OrchestratorMetrics::default();
        for job in self.list_jobs().await {
            metrics.total_jobs += 1;
            if job.status.is_active() {
                metrics.active_jobs += 1;
            }
            *metrics.by_status.entry(job.status).or_insert(0) += 1;
            *metrics
                .by_kind
                .entry(job.kind)
                .or_insert_with(BTreeMap::new)
                .entry(job.status)
                .or_insert(0) += 1;
            metrics.retry_events += job.metrics.retry_events.len();
            metrics.units_succeeded += job.metrics.units_succeeded;
            metrics.units_failed += job.metrics.units_failed;
        }
        metrics
    }

    /// 等待作业进入终态
    pub async fn wait_for_completion(
        &self,
        job_id: i64,
        timeout: Duration,
    ) -> SchedulerResult<JobSnapshot> {
        let entry = self.entry(job_id).await?;
        tokio::time::timeout(timeout, entry.finished.wait())
            .await
            .map_err(|_| SchedulerError::Internal(format!("等待作业 {job_id} 结束超时")))?;
        Ok(entry.snapshot().await)
    }

    /// 停止所有运行中的作业并等待其结束，返回被停止的作业数
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let entries: Vec<Arc<JobEntry>> = self.inner.jobs.read().await.values().cloned().collect();
        let mut stopped = Vec::new();
        for entry in entries {
            let active = {
                let mut state = entry.state.lock().await;
                let active = state.status.is_active();
                if active {
                    state.stop_requested = true;
                }
                active
            };
            if active {
                entry.stop.trigger();
                stopped.push(entry);
            }
        }

        let count = stopped.len();
        let waits = stopped.iter().map(|entry| entry.finished.wait());
        if tokio::time::timeout(timeout, join_all(waits)).await.is_err() {
            warn!("等待作业结束超时，剩余租约将由过期机制回收");
        }
        count
    }

    async fn entry(&self, job_id: i64) -> SchedulerResult<Arc<JobEntry>> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(SchedulerError::JobNotFound { id: job_id })
    }
}

impl Inner {
    async fn run_job(
        self: Arc<Self>,
        job: Arc<JobEntry>,
        lock: Lock,
        options: StartOptions,
        lease: Duration,
    ) {
        let (job_id, kind) = {
            let state = job.state.lock().await;
            (state.id, state.kind)
        };

        let outcome = AssertUnwindSafe(self.drive_job(&job, &lock, &options, lease))
            .catch_unwind()
            .await;
        let status = match outcome {
            Ok(status) => status,
            Err(panic) => {
                error!(job_id, "作业执行异常终止: {}", panic_message(panic.as_ref()));
                JobStatus::Failed
            }
        };

        if let Err(e) = self.lock_repository.release(lock.id).await {
            warn!(job_id, lock_id = lock.id, "释放任务锁失败，等待租约过期: {}", e);
        }
        self.active_keys.lock().await.remove(&(kind, lock.task_id));

        {
            let mut state = job.state.lock().await;
            state.status = status;
            state.finished_at = Some(Utc::now());
        }
        job.finished.trigger();

        metrics::counter!(
            "jobhub_jobs_finished_total",
            "kind" => kind.as_str(),
            "status" => status.as_str()
        )
        .increment(1);
        metrics::gauge!("jobhub_jobs_active").decrement(1.0);
        info!(job_id, status = status.as_str(), "作业结束: {}", kind);
    }

    async fn drive_job(
        &self,
        job: &Arc<JobEntry>,
        lock: &Lock,
        options: &StartOptions,
        lease: Duration,
    ) -> JobStatus {
        let (job_id, kind, task_id, request_id) = {
            let state = job.state.lock().await;
            (state.id, state.kind, state.task_id, state.request_id.clone())
        };
        let context = ErrorContext::new(kind, task_id, request_id);

        let workers = match self
            .worker_repository
            .list_active(self.config.min_worker_capacity, self.staleness)
            .await
        {
            Ok(workers) => workers,
            Err(e) => {
                let category = self.classifier.classify_scheduler_error(&e);
                self.record_unit_error(job, None, category, e.to_string(), 1, &context)
                    .await;
                error!(job_id, request_id = %context.request_id, "查询Worker失败: {}", e);
                return JobStatus::Failed;
            }
        };
        let Some(worker) = self.strategy.select(kind, &workers).cloned() else {
            let e = SchedulerError::NoActiveWorker { kind };
            self.record_unit_error(
                job,
                None,
                ErrorCategory::BusinessLogic,
                e.to_string(),
                0,
                &context,
            )
            .await;
            warn!(job_id, request_id = %context.request_id, "{}", e);
            return JobStatus::Failed;
        };
        let context = context.with_worker(worker.id.clone());

        let _kind_permit = tokio::select! {
            permit = self.limiter.acquire_global_slot(kind) => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id, "获取作业类型槽位失败: {}", e);
                    return JobStatus::Failed;
                }
            },
            _ = job.stop.wait() => return self.cancel_pending(job).await,
        };
        if job.stop.is_set() {
            return self.cancel_pending(job).await;
        }

        {
            let mut state = job.state.lock().await;
            state.status = JobStatus::Running;
            state.worker_id = Some(worker.id.clone());
            state.started_at = Some(Utc::now());
        }
        info!(job_id, worker_id = %worker.id, "作业开始运行: {}", kind);

        let (renew_stop_tx, renew_stop_rx) = oneshot::channel();
        let renew_handle = tokio::spawn(renew_loop(
            self.lock_repository.clone(),
            job.clone(),
            lock.id,
            lease,
            self.config.renew_interval_for(lease),
            renew_stop_rx,
        ));

        let accounts: Vec<Option<i64>> = if options.account_ids.is_empty() {
            vec![None]
        } else {
            options.account_ids.iter().copied().map(Some).collect()
        };
        let units = accounts.into_iter().map(|account_id| {
            self.run_unit(job, &worker, account_id, &options.params, &context)
        });
        let outcomes = join_all(units).await;

        let _ = renew_stop_tx.send(());
        if let Err(e) = renew_handle.await {
            warn!(job_id, "续约任务异常结束: {}", e);
        }

        if job.stop.is_set() {
            return JobStatus::Failed;
        }
        let succeeded = outcomes
            .iter()
            .filter(|o| **o == UnitOutcome::Succeeded)
            .count();
        let failed = outcomes.iter().filter(|o| **o == UnitOutcome::Failed).count();
        JobStatus::from_unit_outcomes(succeeded, failed)
    }

    async fn run_unit(
        &self,
        job: &Arc<JobEntry>,
        worker: &WorkerNode,
        account_id: Option<i64>,
        params: &serde_json::Value,
        context: &ErrorContext,
    ) -> UnitOutcome {
        let (job_id, kind, task_id) = {
            let state = job.state.lock().await;
            (state.id, state.kind, state.task_id)
        };
        let context = context.clone().with_account(account_id);

        if job.stop.is_set() {
            return self.record_cancelled(job).await;
        }

        let _account_permit = match account_id {
            Some(account_id) => tokio::select! {
                permit = self.limiter.acquire_account_slot(account_id) => match permit {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        self.record_unit_error(
                            job,
                            Some(account_id),
                            ErrorCategory::System,
                            e.to_string(),
                            0,
                            &context,
                        )
                        .await;
                        return UnitOutcome::Failed;
                    }
                },
                _ = job.stop.wait() => return self.record_cancelled(job).await,
            },
            None => None,
        };

        let policy = if kind.is_auth_flow() {
            &self.auth_policy
        } else {
            &self.standard_policy
        };

        let mut attempt: u32 = 0;
        loop {
            if job.stop.is_set() {
                return self.record_cancelled(job).await;
            }

            let unit = WorkUnit {
                job_id,
                kind,
                task_id,
                account_id,
                attempt,
                request_id: context.request_id.clone(),
                params: params.clone(),
            };
            let result = AssertUnwindSafe(self.executor.execute(worker, &unit))
                .catch_unwind()
                .await;
            let (category, message) = match result {
                Ok(Ok(_)) => {
                    job.state.lock().await.metrics.units_succeeded += 1;
                    metrics::counter!("jobhub_units_succeeded_total", "kind" => kind.as_str())
                        .increment(1);
                    debug!(job_id, account_id = ?account_id, attempt, "执行单元成功");
                    return UnitOutcome::Succeeded;
                }
                Ok(Err(e)) => (self.classifier.classify_scheduler_error(&e), e.to_string()),
                Err(panic) => (ErrorCategory::System, panic_message(panic.as_ref())),
            };

            if !policy.should_retry(category, attempt) {
                error!(
                    job_id,
                    operation = %context.operation,
                    request_id = %context.request_id,
                    worker_id = ?context.worker_id,
                    account_id = ?context.account_id,
                    task_id = context.task_id,
                    attempt,
                    category = category.as_str(),
                    "执行单元失败: {}",
                    message
                );
                if let Err(e) = self
                    .worker_repository
                    .report_error(&worker.id, &message)
                    .await
                {
                    debug!("记录Worker错误失败: {}", e);
                }
                self.record_unit_error(job, account_id, category, message, attempt + 1, &context)
                    .await;
                return UnitOutcome::Failed;
            }

            let delay = policy.delay_for(attempt);
            warn!(
                job_id,
                operation = %context.operation,
                request_id = %context.request_id,
                worker_id = ?context.worker_id,
                account_id = ?context.account_id,
                task_id = context.task_id,
                attempt,
                category = category.as_str(),
                policy = policy.name(),
                "执行单元失败，{:?} 后重试: {}",
                delay,
                message
            );
            job.state.lock().await.metrics.retry_events.push(RetryEvent {
                attempt,
                category,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                message,
                context: context.clone(),
                at: Utc::now(),
            });
            metrics::counter!(
                "jobhub_unit_retries_total",
                "kind" => kind.as_str(),
                "category" => category.as_str()
            )
            .increment(1);

            if !job.stop.sleep(delay).await {
                return self.record_cancelled(job).await;
            }
            attempt += 1;
        }
    }

    /// 作业在派发前被停止：所有执行单元都记为取消
    async fn cancel_pending(&self, job: &Arc<JobEntry>) -> JobStatus {
        let mut state = job.state.lock().await;
        state.metrics.units_cancelled = state.metrics.units_total;
        info!(job_id = state.id, "作业在等待槽位时被停止");
        JobStatus::Failed
    }

    async fn record_cancelled(&self, job: &Arc<JobEntry>) -> UnitOutcome {
        job.state.lock().await.metrics.units_cancelled += 1;
        UnitOutcome::Cancelled
    }

    async fn record_unit_error(
        &self,
        job: &Arc<JobEntry>,
        account_id: Option<i64>,
        category: ErrorCategory,
        message: String,
        attempts: u32,
        context: &ErrorContext,
    ) {
        let mut state = job.state.lock().await;
        state.metrics.units_failed += 1;
        state.metrics.unit_errors.push(UnitError {
            account_id,
            category,
            message,
            attempts,
            context: context.clone(),
        });
        metrics::counter!(
            "jobhub_units_failed_total",
            "kind" => state.kind.as_str(),
            "category" => category.as_str()
        )
        .increment(1);
    }
}

/// 周期续约，续约失败视为失去租约并停止作业
async fn renew_loop(
    lock_repository: Arc<dyn LockRepository>,
    job: Arc<JobEntry>,
    lock_id: i64,
    lease: Duration,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let Ok(chrono_lease) = chrono::Duration::from_std(lease) else {
        return;
    };
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = &mut stop_rx => return,
        }
        match lock_repository.renew(lock_id, chrono_lease).await {
            Ok(true) => debug!(lock_id, "任务锁续约成功"),
            Ok(false) => {
                warn!(lock_id, "任务锁已丢失，停止作业");
                job.state.lock().await.stop_requested = true;
                job.stop.trigger();
                return;
            }
            Err(e) => warn!(lock_id, "任务锁续约失败，稍后重试: {}", e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("执行器崩溃: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("执行器崩溃: {message}")
    } else {
        "执行器崩溃".to_string()
    }
}
