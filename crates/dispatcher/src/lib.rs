//! 作业编排
//!
//! 组合任务锁、Worker目录、错误分类、重试策略与并发限制，驱动作业从启动到终态。

pub mod concurrency;
pub mod error_classifier;
pub mod http_executor;
pub mod orchestrator;
pub mod retry_policy;
pub mod strategies;

pub use concurrency::{AccountPermit, ConcurrencyLimiter, KindPermit};
pub use error_classifier::ErrorClassifier;
pub use http_executor::HttpJobExecutor;
pub use orchestrator::{JobOrchestrator, JobOrchestratorBuilder};
pub use retry_policy::{AuthRetryPolicy, RetryDecider, RetryPolicy};
pub use strategies::*;
