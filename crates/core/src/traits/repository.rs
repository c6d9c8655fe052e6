//! 数据仓储层接口定义
//!
//! 此模块定义了锁表与Worker目录的持久化抽象接口：
//! - 任务锁仓储接口 (LockRepository)
//! - Worker仓储接口 (WorkerRepository)
//!
//! ## 设计原则
//!
//! ### 单写者事务语义
//! 锁表是"谁可以运行这个任务"的唯一仲裁者，只能通过原子的
//! acquire / renew / release / sweep 修改。实现必须依赖唯一约束或等价的
//! compare-and-swap 原语，禁止"先读后写"的判定方式。
//!
//! ### 最终一致的Worker目录
//! Worker目录容忍心跳延迟：心跳是否过期在读取时惰性判断，不依赖单独的清扫任务。
//!
//! ### 异步设计
//! - 使用 `async/await` 语法
//! - 返回 `SchedulerResult<T>` 统一错误处理
//! - 实现 `Send + Sync` 确保线程安全
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use chrono::Duration;
//! use jobhub_core::{models::JobKind, traits::LockRepository};
//!
//! async fn run_exclusive(repo: &dyn LockRepository) -> SchedulerResult<()> {
//!     let lock = repo
//!         .acquire(JobKind::Warmup, 42, "node-a", Duration::hours(1))
//!         .await?;
//!     // ... 执行作业，期间定期 renew ...
//!     repo.release(lock.id).await
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{
    JobKind, Lock, LockFilter, SweepCriteria, WorkerNode, WorkerRegistration,
};
use crate::SchedulerResult;

/// 任务锁仓储接口
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// 获取任务锁
    ///
    /// # 参数
    ///
    /// * `kind` / `task_id` - 锁的逻辑键
    /// * `worker_id` - 申请者标识
    /// * `lease` - 租约时长
    ///
    /// # 语义
    ///
    /// - 键上不存在锁，或现有锁已过期：创建新锁（新的锁ID）
    /// - 现有锁由同一申请者持有：幂等成功，延长租约，保留 `acquired_at`
    /// - 现有锁由其他申请者持有且未过期：返回 `LockConflict`
    ///
    /// 两个并发的同键请求必须恰好一个成功。
    async fn acquire(
        &self,
        kind: JobKind,
        task_id: i64,
        worker_id: &str,
        lease: Duration,
    ) -> SchedulerResult<Lock>;

    /// 续约，锁已不存在时返回 `false`
    async fn renew(&self, lock_id: i64, lease: Duration) -> SchedulerResult<bool>;

    /// 释放锁，重复释放不报错
    async fn release(&self, lock_id: i64) -> SchedulerResult<()>;

    /// 按逻辑键查询当前锁记录（可能已过期）
    async fn get(&self, kind: JobKind, task_id: i64) -> SchedulerResult<Option<Lock>>;

    /// 按ID查询锁记录
    async fn get_by_id(&self, lock_id: i64) -> SchedulerResult<Option<Lock>>;

    /// 报表查询
    async fn list(&self, filter: &LockFilter) -> SchedulerResult<Vec<Lock>>;

    /// 查找满足清理条件的锁，按ID升序，`after_id` 用于分页
    async fn find_sweep_candidates(
        &self,
        criteria: &SweepCriteria,
        after_id: Option<i64>,
        limit: u32,
    ) -> SchedulerResult<Vec<Lock>>;

    /// 删除指定锁，删除时重新校验清理条件，期间被续约的锁不会被删除
    async fn delete_candidates(
        &self,
        criteria: &SweepCriteria,
        lock_ids: &[i64],
    ) -> SchedulerResult<u64>;

    /// 分批删除所有在 `now` 时刻已过期的锁，返回删除数量
    async fn sweep_expired(&self, now: DateTime<Utc>, batch_size: u32) -> SchedulerResult<u64> {
        let criteria = SweepCriteria::expired_at(now);
        let mut deleted = 0;
        loop {
            let batch = self.find_sweep_candidates(&criteria, None, batch_size).await?;
            if batch.is_empty() {
                break;
            }
            let ids: Vec<i64> = batch.iter().map(|lock| lock.id).collect();
            let removed = self.delete_candidates(&criteria, &ids).await?;
            deleted += removed;
            if removed == 0 || batch.len() < batch_size as usize {
                break;
            }
        }
        Ok(deleted)
    }
}

/// Worker仓储接口
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// 注册Worker
    ///
    /// 以 `base_url` 为唯一键执行 upsert：已存在时保留原ID，刷新名称与容量并重新激活。
    ///
    /// # 错误
    ///
    /// * `Validation` - `base_url` 不是合法的 http(s) 地址或容量非正数
    /// * `Database` - 数据库操作失败
    async fn register(&self, registration: &WorkerRegistration) -> SchedulerResult<String>;

    /// 更新心跳时间
    async fn heartbeat(&self, worker_id: &str) -> SchedulerResult<()>;

    /// 记录Worker最近一次错误
    async fn report_error(&self, worker_id: &str, message: &str) -> SchedulerResult<()>;

    /// 将Worker标记为非活跃
    async fn deactivate(&self, worker_id: &str) -> SchedulerResult<()>;

    async fn get(&self, worker_id: &str) -> SchedulerResult<Option<WorkerNode>>;

    async fn list_all(&self) -> SchedulerResult<Vec<WorkerNode>>;

    /// 可调度的Worker列表
    ///
    /// 过滤条件：`is_active`、容量不小于 `min_capacity`、心跳未超过 `staleness`。
    /// 排序：容量降序，名称升序。
    async fn list_active(
        &self,
        min_capacity: i32,
        staleness: Duration,
    ) -> SchedulerResult<Vec<WorkerNode>>;
}
