//! # 数据模型
//!
//! 定义作业编排与分布式锁子系统的核心数据结构。
//!
//! ## 核心模型
//!
//! ### JobKind - 作业类型
//! 8种自动化作业类型，字符串形式同时用于HTTP路径与锁表。
//!
//! ### Lock - 任务锁
//! 以 `(kind, task_id)` 为键的租约记录，保证同一逻辑任务最多一个活跃执行。
//!
//! ### WorkerNode - Worker节点信息
//! 基于心跳的Worker目录条目，包含容量与最近错误。
//!
//! ### Job - 作业
//! 由编排器独占管理的作业状态、执行指标与重试记录。
//!
//! ### ErrorContext - 错误上下文
//! 附加在错误和重试决策上的关联信息，仅用于日志与排查。
//!
//! ## 设计原则
//!
//! - 所有时间字段使用 `DateTime<Utc>` 确保时区一致性
//! - 状态字段使用枚举类型，避免无效状态
//! - 实现 `serde::Serialize` 和 `serde::Deserialize`，直接用于HTTP响应

pub mod error_context;
pub mod job;
pub mod job_kind;
pub mod lock;
pub mod worker;

pub use error_context::{ErrorCategory, ErrorContext};
pub use job::{
    JobMetrics, JobSnapshot, JobStatus, OrchestratorMetrics, RetryEvent, StartOptions,
    StartResponse, UnitError,
};
pub use job_kind::JobKind;
pub use lock::{Lock, LockFilter, SweepCriteria, SweepReport};
pub use worker::{
    ClaimRequest, ClaimResponse, WorkerAck, WorkerErrorReport, WorkerNode, WorkerRegistered,
    WorkerRegistration,
};
