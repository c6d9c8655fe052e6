//! 错误分类
//!
//! 把任意错误映射为 [`ErrorCategory`]，供重试策略决定是否重试。
//! 带类型的 [`SchedulerError`] 直接按变体映射；其他错误退化为按消息内容匹配。

use std::error::Error;

use jobhub_core::{models::ErrorCategory, SchedulerError};

const NETWORK_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "connect",
    "network",
    "dns",
    "broken pipe",
];
const DATABASE_PATTERNS: &[&str] = &["sql", "database", "deadlock"];
const AUTH_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "invalid credentials",
];
const VALIDATION_PATTERNS: &[&str] = &["invalid", "validation", "malformed"];
const EXTERNAL_API_PATTERNS: &[&str] = &["http", "api", "status code", "bad gateway"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 对错误分类，对任何输入都有确定的结果
    pub fn classify(&self, error: &(dyn Error + 'static)) -> ErrorCategory {
        if let Some(err) = error.downcast_ref::<SchedulerError>() {
            if let Some(category) = Self::classify_typed(err) {
                return category;
            }
        }
        if error.downcast_ref::<sqlx::Error>().is_some() {
            return ErrorCategory::Database;
        }
        Self::classify_message(&error.to_string())
    }

    pub fn classify_scheduler_error(&self, error: &SchedulerError) -> ErrorCategory {
        Self::classify_typed(error).unwrap_or_else(|| Self::classify_message(&error.to_string()))
    }

    fn classify_typed(error: &SchedulerError) -> Option<ErrorCategory> {
        let category = match error {
            SchedulerError::Database(_) | SchedulerError::DatabaseOperation(_) => {
                ErrorCategory::Database
            }
            SchedulerError::Network(_) => ErrorCategory::Network,
            SchedulerError::ExternalApi(_) => ErrorCategory::ExternalApi,
            SchedulerError::Authentication(_) => ErrorCategory::Authentication,
            SchedulerError::Validation(_) | SchedulerError::Serialization(_) => {
                ErrorCategory::Validation
            }
            SchedulerError::BusinessLogic(_)
            | SchedulerError::LockConflict { .. }
            | SchedulerError::LockNotFound { .. }
            | SchedulerError::JobNotFound { .. }
            | SchedulerError::WorkerNotFound { .. }
            | SchedulerError::NoActiveWorker { .. } => ErrorCategory::BusinessLogic,
            SchedulerError::Configuration(_) | SchedulerError::Cancelled => ErrorCategory::System,
            SchedulerError::Internal(_) => return None,
        };
        Some(category)
    }

    fn classify_message(message: &str) -> ErrorCategory {
        let message = message.to_lowercase();
        let contains_any = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

        if contains_any(NETWORK_PATTERNS) {
            ErrorCategory::Network
        } else if contains_any(DATABASE_PATTERNS) {
            ErrorCategory::Database
        } else if contains_any(AUTH_PATTERNS) {
            ErrorCategory::Authentication
        } else if contains_any(VALIDATION_PATTERNS) {
            ErrorCategory::Validation
        } else if contains_any(EXTERNAL_API_PATTERNS) {
            ErrorCategory::ExternalApi
        } else {
            ErrorCategory::System
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhub_core::models::JobKind;

    fn classify_io(message: &str) -> ErrorCategory {
        let err = std::io::Error::other(message.to_string());
        ErrorClassifier::new().classify(&err)
    }

    #[test]
    fn test_typed_errors_map_directly() {
        let classifier = ErrorClassifier::new();
        let cases = [
            (SchedulerError::Network("reset".into()), ErrorCategory::Network),
            (
                SchedulerError::Authentication("expired".into()),
                ErrorCategory::Authentication,
            ),
            (
                SchedulerError::ExternalApi("500".into()),
                ErrorCategory::ExternalApi,
            ),
            (
                SchedulerError::Validation("bad".into()),
                ErrorCategory::Validation,
            ),
            (
                SchedulerError::lock_conflict(JobKind::Bio, 1, "node-a"),
                ErrorCategory::BusinessLogic,
            ),
            (
                SchedulerError::DatabaseOperation("locked".into()),
                ErrorCategory::Database,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(classifier.classify(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_typed_variant_wins_over_message() {
        // 消息里带有 timeout，但变体是认证错误
        let err = SchedulerError::Authentication("session timeout".into());
        assert_eq!(
            ErrorClassifier::new().classify(&err),
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn test_message_patterns_in_order() {
        assert_eq!(classify_io("Connection refused"), ErrorCategory::Network);
        assert_eq!(classify_io("request timed out"), ErrorCategory::Network);
        assert_eq!(classify_io("SQL logic error"), ErrorCategory::Database);
        assert_eq!(classify_io("got 401 from login"), ErrorCategory::Authentication);
        assert_eq!(classify_io("invalid proxy format"), ErrorCategory::Validation);
        assert_eq!(classify_io("HTTP 502 upstream"), ErrorCategory::ExternalApi);
        assert_eq!(classify_io("something odd"), ErrorCategory::System);
    }

    #[test]
    fn test_internal_falls_back_to_message() {
        let err = SchedulerError::Internal("connection pool exhausted".into());
        assert_eq!(
            ErrorClassifier::new().classify_scheduler_error(&err),
            ErrorCategory::Network
        );
    }
}
