use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::JobKind;

/// 任务锁（租约）
///
/// 每个 `(kind, task_id)` 最多存在一条未过期的锁记录。持有者在作业运行期间续约，
/// 作业结束时释放；持有者崩溃时锁在 `expires_at` 之后可被其他Worker重新获取。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub id: i64,
    pub kind: JobKind,
    pub task_id: i64,
    pub worker_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lock {
    /// `now > expires_at` 时视为过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.worker_id == worker_id
    }

    /// 剩余租约时长，已过期时为零
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// 锁查询过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockFilter {
    pub kind: Option<JobKind>,
    pub worker_id: Option<String>,
    /// 仅返回已过期的锁
    #[serde(default)]
    pub expired_only: bool,
}

/// 清理候选条件
///
/// 默认仅匹配已过期的租约；`stale_before` 额外匹配在该时间之后未再续约的租约
/// （即使尚未过期），对应维护命令的强制模式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepCriteria {
    pub now: DateTime<Utc>,
    pub worker_id: Option<String>,
    pub stale_before: Option<DateTime<Utc>>,
}

impl SweepCriteria {
    pub fn expired_at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            worker_id: None,
            stale_before: None,
        }
    }

    pub fn matches(&self, lock: &Lock) -> bool {
        if let Some(worker_id) = &self.worker_id {
            if &lock.worker_id != worker_id {
                return false;
            }
        }
        let stale = self
            .stale_before
            .map(|cutoff| lock.updated_at < cutoff)
            .unwrap_or(false);
        lock.is_expired_at(self.now) || stale
    }
}

/// 一次清理操作的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub dry_run: bool,
    pub candidates: Vec<Lock>,
    pub deleted: u64,
    pub batches: u32,
}

impl SweepReport {
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}
