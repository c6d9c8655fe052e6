use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorCategory, ErrorContext, JobKind};

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartiallyCompleted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::PartiallyCompleted
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
        }
    }

    /// 根据各执行单元的结果推导终态
    pub fn from_unit_outcomes(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) if succeeded > 0 => JobStatus::Completed,
            (0, _) => JobStatus::Failed,
            _ => JobStatus::PartiallyCompleted,
        }
    }
}

/// 启动作业的可选参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartOptions {
    /// 参与本次作业的账号；为空时作业只有一个不绑定账号的执行单元
    #[serde(default)]
    pub account_ids: Vec<i64>,
    /// 覆盖该类型默认的租约时长
    #[serde(default)]
    pub lease_seconds: Option<u64>,
    /// 透传给执行器的参数
    #[serde(default)]
    pub params: serde_json::Value,
}

/// 启动作业的响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: i64,
    pub accepted: bool,
}

/// 一次重试事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEvent {
    pub attempt: u32,
    pub category: ErrorCategory,
    pub delay_ms: u64,
    pub message: String,
    pub context: ErrorContext,
    pub at: DateTime<Utc>,
}

impl RetryEvent {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// 执行单元的最终错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitError {
    pub account_id: Option<i64>,
    pub category: ErrorCategory,
    pub message: String,
    pub attempts: u32,
    pub context: ErrorContext,
}

/// 单个作业的执行指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetrics {
    pub units_total: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
    pub units_cancelled: usize,
    pub retry_events: Vec<RetryEvent>,
    pub unit_errors: Vec<UnitError>,
}

/// 作业只读快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: i64,
    pub kind: JobKind,
    pub task_id: i64,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub lock_id: i64,
    pub request_id: String,
    pub stop_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: JobMetrics,
}

/// 编排器汇总指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub total_jobs: usize,
    pub active_jobs: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub by_kind: BTreeMap<JobKind, BTreeMap<JobStatus, usize>>,
    pub retry_events: usize,
    pub units_succeeded: usize,
    pub units_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_from_outcomes() {
        assert_eq!(JobStatus::from_unit_outcomes(3, 0), JobStatus::Completed);
        assert_eq!(JobStatus::from_unit_outcomes(0, 2), JobStatus::Failed);
        assert_eq!(
            JobStatus::from_unit_outcomes(1, 1),
            JobStatus::PartiallyCompleted
        );
        assert_eq!(JobStatus::from_unit_outcomes(0, 0), JobStatus::Failed);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::PartiallyCompleted).unwrap(),
            "\"PARTIALLY_COMPLETED\""
        );
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Failed.is_terminal());
    }
}
