use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jobhub_core::{config::ConcurrencyConfig, models::JobKind, SchedulerError, SchedulerResult};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// 账号执行许可，离开作用域时释放账号互斥与并行槽位
#[derive(Debug)]
pub struct AccountPermit {
    account_id: i64,
    _slot: OwnedSemaphorePermit,
    _account: OwnedMutexGuard<()>,
}

impl AccountPermit {
    pub fn account_id(&self) -> i64 {
        self.account_id
    }
}

/// 作业类型并发许可
#[derive(Debug)]
pub struct KindPermit {
    kind: JobKind,
    _permit: OwnedSemaphorePermit,
}

impl KindPermit {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

/// 并发限制器
///
/// 账号维度：同一账号同一时刻只有一个操作；同时执行的账号数不超过
/// `max_parallel_accounts`；相邻两次账号启动至少间隔 `stagger`。
/// 作业类型维度：每种类型同时运行的作业数有上限。
pub struct ConcurrencyLimiter {
    account_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    account_slots: Arc<Semaphore>,
    max_parallel_accounts: usize,
    stagger: Duration,
    last_start: Mutex<Option<Instant>>,
    kind_slots: HashMap<JobKind, Arc<Semaphore>>,
    kind_limits: HashMap<JobKind, usize>,
}

impl ConcurrencyLimiter {
    pub fn new(config: &ConcurrencyConfig) -> Self {
        let kind_limits: HashMap<JobKind, usize> = JobKind::ALL
            .iter()
            .map(|kind| (*kind, config.limit_for(*kind)))
            .collect();
        let kind_slots = kind_limits
            .iter()
            .map(|(kind, limit)| (*kind, Arc::new(Semaphore::new(*limit))))
            .collect();

        Self {
            account_locks: Mutex::new(HashMap::new()),
            account_slots: Arc::new(Semaphore::new(config.max_parallel_accounts)),
            max_parallel_accounts: config.max_parallel_accounts,
            stagger: config.stagger(),
            last_start: Mutex::new(None),
            kind_slots,
            kind_limits,
        }
    }

    /// 获取账号执行许可
    ///
    /// 先取账号互斥，再取并行槽位，最后等待启动间隔。
    pub async fn acquire_account_slot(&self, account_id: i64) -> SchedulerResult<AccountPermit> {
        let account_lock = {
            let mut locks = self.account_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(account_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let account_guard = account_lock.lock_owned().await;

        let slot = self
            .account_slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::Internal("账号并发槽位已关闭".to_string()))?;

        if !self.stagger.is_zero() {
            let mut last_start = self.last_start.lock().await;
            if let Some(previous) = *last_start {
                let earliest = previous + self.stagger;
                if earliest > Instant::now() {
                    debug!("账号 {} 等待启动间隔", account_id);
                    tokio::time::sleep_until(earliest).await;
                }
            }
            *last_start = Some(Instant::now());
        }

        Ok(AccountPermit {
            account_id,
            _slot: slot,
            _account: account_guard,
        })
    }

    /// 获取作业类型并发许可
    pub async fn acquire_global_slot(&self, kind: JobKind) -> SchedulerResult<KindPermit> {
        let semaphore = self.kind_slots.get(&kind).ok_or_else(|| {
            SchedulerError::Internal(format!("作业类型 {kind} 没有并发配置"))
        })?;
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::Internal(format!("作业类型 {kind} 的槽位已关闭")))?;

        Ok(KindPermit {
            kind,
            _permit: permit,
        })
    }

    pub fn available_account_slots(&self) -> usize {
        self.account_slots.available_permits()
    }

    pub fn max_parallel_accounts(&self) -> usize {
        self.max_parallel_accounts
    }

    pub fn available_kind_slots(&self, kind: JobKind) -> usize {
        self.kind_slots
            .get(&kind)
            .map(|semaphore| semaphore.available_permits())
            .unwrap_or(0)
    }

    pub fn kind_limit(&self, kind: JobKind) -> usize {
        self.kind_limits.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_parallel_accounts: usize, stagger_ms: u64) -> Arc<ConcurrencyLimiter> {
        let mut config = ConcurrencyConfig {
            max_parallel_accounts,
            account_stagger_ms: stagger_ms,
            max_jobs_per_kind: 2,
            ..ConcurrencyConfig::default()
        };
        config.kind_overrides.insert("bulk_login".to_string(), 1);
        Arc::new(ConcurrencyLimiter::new(&config))
    }

    #[tokio::test]
    async fn test_extra_account_blocks_until_slot_frees() {
        let limiter = limiter(4, 0);

        let mut permits = Vec::new();
        for account_id in 1..=4 {
            permits.push(limiter.acquire_account_slot(account_id).await.unwrap());
        }
        assert_eq!(limiter.available_account_slots(), 0);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire_account_slot(5),
        )
        .await;
        assert!(blocked.is_err(), "fifth account must wait");

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire_account_slot(5).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(permits.pop());

        let permit = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("slot should be handed over")
            .unwrap()
            .unwrap();
        assert_eq!(permit.account_id(), 5);
    }

    #[tokio::test]
    async fn test_same_account_is_serialized() {
        let limiter = limiter(4, 0);
        let first = limiter.acquire_account_slot(7).await.unwrap();

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire_account_slot(7),
        )
        .await;
        assert!(second.is_err());
        // 其他账号不受影响
        assert!(limiter.acquire_account_slot(8).await.is_ok());

        drop(first);
        assert!(limiter.acquire_account_slot(7).await.is_ok());
    }

    #[tokio::test]
    async fn test_slots_released_on_error_and_panic() {
        let limiter = limiter(2, 0);

        let failing = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire_account_slot(1).await?;
                Err::<(), _>(SchedulerError::Network("reset".to_string()))
            })
        };
        assert!(failing.await.unwrap().is_err());

        let panicking = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire_account_slot(2).await.unwrap();
                panic!("executor crashed");
            })
        };
        assert!(panicking.await.is_err());

        assert_eq!(limiter.available_account_slots(), 2);
        assert!(limiter.acquire_account_slot(1).await.is_ok());
        assert!(limiter.acquire_account_slot(2).await.is_ok());
    }

    #[tokio::test]
    async fn test_stagger_between_account_starts() {
        let limiter = limiter(4, 100);
        let started = Instant::now();

        let _a = limiter.acquire_account_slot(1).await.unwrap();
        let _b = limiter.acquire_account_slot(2).await.unwrap();
        let _c = limiter.acquire_account_slot(3).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_kind_slots() {
        let limiter = limiter(4, 0);
        assert_eq!(limiter.kind_limit(JobKind::BulkLogin), 1);
        assert_eq!(limiter.kind_limit(JobKind::Warmup), 2);

        let permit = limiter.acquire_global_slot(JobKind::BulkLogin).await.unwrap();
        assert_eq!(permit.kind(), JobKind::BulkLogin);
        assert_eq!(limiter.available_kind_slots(JobKind::BulkLogin), 0);
        assert!(tokio::time::timeout(
            Duration::from_millis(50),
            limiter.acquire_global_slot(JobKind::BulkLogin)
        )
        .await
        .is_err());

        drop(permit);
        assert_eq!(limiter.available_kind_slots(JobKind::BulkLogin), 1);
    }
}
