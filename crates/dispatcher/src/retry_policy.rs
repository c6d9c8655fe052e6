use std::time::Duration;

use jobhub_core::{
    config::{AuthRetryConfig, RetryConfig},
    models::ErrorCategory,
};
use rand::Rng;

/// 重试决策
///
/// `attempt` 是刚刚失败的那次尝试的序号，从0开始。
pub trait RetryDecider: Send + Sync {
    fn should_retry(&self, category: ErrorCategory, attempt: u32) -> bool;

    fn delay_for(&self, attempt: u32) -> Duration;

    fn name(&self) -> &str;
}

const DATABASE_RETRY_WINDOW: u32 = 2;

/// 按错误类别判断是否值得重试，不考虑次数上限以外的约束
fn category_allows_retry(category: ErrorCategory, attempt: u32, database_window: u32) -> bool {
    match category {
        ErrorCategory::Network | ErrorCategory::ExternalApi => true,
        ErrorCategory::Database => attempt < database_window,
        ErrorCategory::Authentication
        | ErrorCategory::Validation
        | ErrorCategory::BusinessLogic
        | ErrorCategory::System => false,
    }
}

/// 标准重试策略
///
/// 认证、校验、业务逻辑、系统错误不重试；网络与外部接口错误在
/// `attempt < max_retries` 时重试；数据库错误只在前两次尝试内重试。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    database_retry_window: u32,
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_retries,
            database_retry_window: DATABASE_RETRY_WINDOW,
            delays,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            database_retry_window: config.database_retry_window,
            delays: config
                .delay_table_seconds
                .iter()
                .map(|seconds| Duration::from_secs(*seconds))
                .collect(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryDecider for RetryPolicy {
    fn should_retry(&self, category: ErrorCategory, attempt: u32) -> bool {
        attempt < self.max_retries
            && category_allows_retry(category, attempt, self.database_retry_window)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or_default()
    }

    fn name(&self) -> &str {
        "standard"
    }
}

/// 认证流程的重试策略：随机抖动的指数退避
///
/// `delay = uniform(min, max) * multiplier^(attempt + 1)`。可重试的类别与标准策略
/// 相同，总尝试次数再受 `max_attempts` 限制。
#[derive(Debug, Clone)]
pub struct AuthRetryPolicy {
    min_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl AuthRetryPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            multiplier,
            max_attempts,
        }
    }

    pub fn from_config(config: &AuthRetryConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.min_delay_seconds),
            Duration::from_secs_f64(config.max_delay_seconds),
            config.multiplier,
            config.max_attempts,
        )
    }

    /// 会话恢复：只尝试一次，不等待
    pub fn session_restore() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0, 1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self::from_config(&AuthRetryConfig::default())
    }
}

impl RetryDecider for AuthRetryPolicy {
    fn should_retry(&self, category: ErrorCategory, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
            && category_allows_retry(category, attempt, DATABASE_RETRY_WINDOW)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let base = if max > min {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        let exponent = i32::try_from(attempt.saturating_add(1)).unwrap_or(i32::MAX);
        let seconds = base * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    fn name(&self) -> &str {
        "auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_policy_categories() {
        let policy = RetryPolicy::default();

        for attempt in 0..5 {
            assert!(!policy.should_retry(ErrorCategory::Authentication, attempt));
            assert!(!policy.should_retry(ErrorCategory::Validation, attempt));
            assert!(!policy.should_retry(ErrorCategory::BusinessLogic, attempt));
            assert!(!policy.should_retry(ErrorCategory::System, attempt));
        }

        assert!(policy.should_retry(ErrorCategory::Network, 0));
        assert!(policy.should_retry(ErrorCategory::Network, 2));
        assert!(!policy.should_retry(ErrorCategory::Network, 3));
        assert!(policy.should_retry(ErrorCategory::ExternalApi, 2));
        assert!(!policy.should_retry(ErrorCategory::ExternalApi, 3));

        assert!(policy.should_retry(ErrorCategory::Database, 1));
        assert!(!policy.should_retry(ErrorCategory::Database, 2));
    }

    #[test]
    fn test_delay_table_is_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 5, 10, 10, 10]);
    }

    #[test]
    fn test_empty_delay_table_means_no_wait() {
        let policy = RetryPolicy::new(3, Vec::new());
        assert_eq!(policy.delay_for(4), Duration::ZERO);
    }

    #[test]
    fn test_auth_policy_never_retries_credentials() {
        let policy = AuthRetryPolicy::default();
        assert!(!policy.should_retry(ErrorCategory::Authentication, 0));
        assert!(!policy.should_retry(ErrorCategory::Validation, 0));
        assert!(policy.should_retry(ErrorCategory::Network, 0));
        assert!(policy.should_retry(ErrorCategory::Network, 1));
        assert!(!policy.should_retry(ErrorCategory::Network, 2));
    }

    #[test]
    fn test_auth_policy_surfaces_system_errors_immediately() {
        let policy = AuthRetryPolicy::new(Duration::ZERO, Duration::ZERO, 1.0, 10);
        for attempt in 0..5 {
            assert!(!policy.should_retry(ErrorCategory::System, attempt));
            assert!(!policy.should_retry(ErrorCategory::BusinessLogic, attempt));
        }
        assert!(policy.should_retry(ErrorCategory::Database, 1));
        assert!(!policy.should_retry(ErrorCategory::Database, 2));
        assert!(policy.should_retry(ErrorCategory::ExternalApi, 8));
        assert!(!policy.should_retry(ErrorCategory::ExternalApi, 9));
    }

    #[test]
    fn test_auth_delay_within_exponential_bounds() {
        let policy = AuthRetryPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(3),
            2.0,
            3,
        );
        for attempt in 0..3 {
            let factor = 2f64.powi(attempt as i32 + 1);
            let delay = policy.delay_for(attempt).as_secs_f64();
            assert!(delay >= factor - 1e-9, "attempt {attempt}: {delay}");
            assert!(delay <= 3.0 * factor + 1e-9, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn test_session_restore_is_single_attempt() {
        let policy = AuthRetryPolicy::session_restore();
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(ErrorCategory::Network, 0));
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }
}
