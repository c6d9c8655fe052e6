use std::fmt;

use serde::{Deserialize, Serialize};

use super::JobKind;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    Database,
    Authentication,
    Validation,
    BusinessLogic,
    System,
    ExternalApi,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Database => "DATABASE",
            ErrorCategory::Authentication => "AUTHENTICATION",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::BusinessLogic => "BUSINESS_LOGIC",
            ErrorCategory::System => "SYSTEM",
            ErrorCategory::ExternalApi => "EXTERNAL_API",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误关联上下文
///
/// 附加在每一次错误与重试决策上用于日志关联，不作为业务数据持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub worker_id: Option<String>,
    pub task_id: i64,
    pub account_id: Option<i64>,
    pub request_id: String,
}

impl ErrorContext {
    pub fn new(kind: JobKind, task_id: i64, request_id: impl Into<String>) -> Self {
        Self {
            operation: kind.to_string(),
            worker_id: None,
            task_id,
            account_id: None,
            request_id: request_id.into(),
        }
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_account(mut self, account_id: Option<i64>) -> Self {
        self.account_id = account_id;
        self
    }
}
