use thiserror::Error;

use crate::models::JobKind;

/// 编排器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务锁冲突: {kind}/{task_id} 已被 {holder} 持有")]
    LockConflict {
        kind: JobKind,
        task_id: i64,
        holder: String,
    },

    #[error("任务锁未找到: {id}")]
    LockNotFound { id: i64 },

    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("没有可用的Worker节点: {kind}")]
    NoActiveWorker { kind: JobKind },

    #[error("网络错误: {0}")]
    Network(String),

    #[error("外部接口错误: {0}")]
    ExternalApi(String),

    #[error("认证失败: {0}")]
    Authentication(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("业务逻辑错误: {0}")]
    BusinessLogic(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("作业已被停止")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 锁冲突的快捷构造
    pub fn lock_conflict(kind: JobKind, task_id: i64, holder: impl Into<String>) -> Self {
        Self::LockConflict {
            kind,
            task_id,
            holder: holder.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LockNotFound { .. } | Self::JobNotFound { .. } | Self::WorkerNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
