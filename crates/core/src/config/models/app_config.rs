use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    dispatcher_worker::{
        ConcurrencyConfig, DistributionConfig, MaintenanceConfig, OrchestratorConfig,
        RegistryConfig, RetryConfig, WorkerConfig,
    },
};

/// 作业编排服务的完整配置，每个段落对应一个组件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub orchestrator: OrchestratorConfig,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub registry: RegistryConfig,
    pub maintenance: MaintenanceConfig,
    pub distribution: DistributionConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 依次叠加默认值、TOML配置文件和 `JOBHUB_` 环境变量（嵌套键用 `__` 分隔，
    /// 例如 `JOBHUB_ORCHESTRATOR__NODE_ID`），加载后立即校验
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/jobhub.toml", "jobhub.toml", "/etc/jobhub/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("JOBHUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.orchestrator.validate().context("编排器配置验证失败")?;
        self.retry.validate().context("重试配置验证失败")?;
        self.concurrency.validate().context("并发配置验证失败")?;
        self.registry.validate().context("Worker目录配置验证失败")?;
        self.maintenance.validate().context("锁维护配置验证失败")?;
        self.distribution.validate().context("素材分配配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.observability.validate().context("可观测性配置验证失败")?;
        Ok(())
    }
}
