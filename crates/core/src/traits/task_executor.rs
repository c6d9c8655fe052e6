//! 作业执行器接口定义
//!
//! 实际的自动化动作（浏览器脚本、接口调用等）不属于编排子系统，
//! 编排器只通过 [`JobExecutor`] 把一个执行单元交给选中的Worker。
//!
//! 执行单元的粒度是"一个作业中的一个账号"；没有账号的作业只有一个单元。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{JobKind, WorkerNode};
use crate::SchedulerResult;

/// 一个执行单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub job_id: i64,
    pub kind: JobKind,
    pub task_id: i64,
    pub account_id: Option<i64>,
    /// 从0开始的尝试序号
    pub attempt: u32,
    pub request_id: String,
    pub params: serde_json::Value,
}

/// 作业执行器
///
/// 返回的错误会交给错误分类器决定是否重试，实现方应尽量返回带类型的
/// `SchedulerError` 变体（如 `Network`、`Authentication`）。
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        worker: &WorkerNode,
        unit: &WorkUnit,
    ) -> SchedulerResult<serde_json::Value>;
}
