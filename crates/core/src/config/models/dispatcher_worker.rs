use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::JobKind;

/// 编排器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 当前编排节点标识，作为锁持有者写入锁表；为空时启动时取 主机名-进程号
    pub node_id: String,
    /// 默认租约时长（秒）
    pub lease_seconds: u64,
    /// 按作业类型覆盖租约时长，键为 snake_case 的作业类型
    pub lease_overrides: HashMap<String, u64>,
    /// 续约间隔（秒），0 表示取租约时长的三分之一
    pub renew_interval_seconds: u64,
    /// 参与调度的Worker最小容量
    pub min_worker_capacity: i32,
    /// 单次派发到Worker的HTTP超时（秒）
    pub executor_timeout_seconds: u64,
    /// 关闭时等待运行中作业结束的时长（秒）
    pub shutdown_timeout_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            lease_seconds: 3600,
            lease_overrides: HashMap::new(),
            renew_interval_seconds: 0,
            min_worker_capacity: 1,
            executor_timeout_seconds: 300,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lease_seconds == 0 {
            return Err(anyhow::anyhow!("租约时长必须大于0"));
        }
        for (kind, seconds) in &self.lease_overrides {
            kind.parse::<JobKind>()
                .map_err(|e| anyhow::anyhow!("租约覆盖配置无效: {e}"))?;
            if *seconds == 0 {
                return Err(anyhow::anyhow!("作业类型 {kind} 的租约时长必须大于0"));
            }
        }
        if self.min_worker_capacity < 0 {
            return Err(anyhow::anyhow!("Worker最小容量不能为负数"));
        }
        if self.executor_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("派发超时时间必须大于0"));
        }
        Ok(())
    }

    /// 指定作业类型的租约时长
    pub fn lease_for(&self, kind: JobKind) -> Duration {
        let seconds = self
            .lease_overrides
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.lease_seconds);
        Duration::from_secs(seconds)
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_secs(self.executor_timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn renew_interval_for(&self, lease: Duration) -> Duration {
        if self.renew_interval_seconds > 0 {
            Duration::from_secs(self.renew_interval_seconds)
        } else {
            (lease / 3).max(Duration::from_millis(100))
        }
    }
}

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 网络与外部接口错误的最大重试次数
    pub max_retries: u32,
    /// 重试间隔表（秒），超出表长后取最后一项
    pub delay_table_seconds: Vec<u64>,
    /// 数据库错误仅在 attempt 小于该值时重试
    pub database_retry_window: u32,
    pub auth: AuthRetryConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_table_seconds: vec![1, 2, 5, 10],
            database_retry_window: 2,
            auth: AuthRetryConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.delay_table_seconds.is_empty() {
            return Err(anyhow::anyhow!("重试间隔表不能为空"));
        }
        self.auth.validate()
    }
}

/// 认证流程的重试配置：指数退避加随机抖动
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRetryConfig {
    pub min_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for AuthRetryConfig {
    fn default() -> Self {
        Self {
            min_delay_seconds: 1.0,
            max_delay_seconds: 3.0,
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl AuthRetryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_delay_seconds < 0.0 || self.max_delay_seconds < self.min_delay_seconds {
            return Err(anyhow::anyhow!(
                "认证重试间隔范围无效: [{}, {}]",
                self.min_delay_seconds,
                self.max_delay_seconds
            ));
        }
        if self.multiplier < 1.0 {
            return Err(anyhow::anyhow!("认证重试倍数不能小于1"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("认证最大尝试次数必须大于0"));
        }
        Ok(())
    }
}

/// 并发控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// 同时执行的账号数上限
    pub max_parallel_accounts: usize,
    /// 相邻两个账号开始执行之间的最小间隔（毫秒）
    pub account_stagger_ms: u64,
    /// 每种作业类型同时运行的作业数上限
    pub max_jobs_per_kind: usize,
    pub kind_overrides: HashMap<String, usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_parallel_accounts: 4,
            account_stagger_ms: 2000,
            max_jobs_per_kind: 2,
            kind_overrides: HashMap::new(),
        }
    }
}

impl ConcurrencyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_parallel_accounts == 0 {
            return Err(anyhow::anyhow!("并行账号数必须大于0"));
        }
        if self.max_jobs_per_kind == 0 {
            return Err(anyhow::anyhow!("每类作业并发数必须大于0"));
        }
        for (kind, limit) in &self.kind_overrides {
            kind.parse::<JobKind>()
                .map_err(|e| anyhow::anyhow!("并发覆盖配置无效: {e}"))?;
            if *limit == 0 {
                return Err(anyhow::anyhow!("作业类型 {kind} 的并发数必须大于0"));
            }
        }
        Ok(())
    }

    pub fn limit_for(&self, kind: JobKind) -> usize {
        self.kind_overrides
            .get(kind.as_str())
            .copied()
            .unwrap_or(self.max_jobs_per_kind)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.account_stagger_ms)
    }
}

/// Worker目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 心跳超过该时长的Worker不参与调度（秒）
    pub heartbeat_staleness_seconds: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_staleness_seconds: 90,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_staleness_seconds <= 0 {
            return Err(anyhow::anyhow!("心跳过期阈值必须大于0"));
        }
        Ok(())
    }

    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_staleness_seconds)
    }
}

/// 锁维护配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub sweep_interval_seconds: u64,
    pub batch_size: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 300,
            batch_size: 100,
        }
    }
}

impl MaintenanceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("清理批次大小必须大于0"));
        }
        Ok(())
    }
}

/// 素材分配配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub bucket_count: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self { bucket_count: 10 }
    }
}

impl DistributionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bucket_count == 0 {
            return Err(anyhow::anyhow!("分桶数量必须大于0"));
        }
        Ok(())
    }
}

/// Worker进程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 控制面地址，Worker通过它注册与发送心跳
    pub control_plane_url: String,
    /// 本Worker对外暴露的地址，全局唯一
    pub base_url: String,
    /// 认领接口的监听地址
    pub listen_address: String,
    pub name: Option<String>,
    pub capacity: i32,
    pub heartbeat_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "http://127.0.0.1:8080".to_string(),
            base_url: "http://127.0.0.1:9000".to_string(),
            listen_address: "0.0.0.0:9000".to_string(),
            name: None,
            capacity: 4,
            heartbeat_interval_seconds: 30,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            return Err(anyhow::anyhow!("Worker地址不能为空"));
        }
        if self.listen_address.is_empty() {
            return Err(anyhow::anyhow!("Worker监听地址不能为空"));
        }
        if self.capacity <= 0 {
            return Err(anyhow::anyhow!("Worker容量必须大于0"));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        Ok(())
    }
}
