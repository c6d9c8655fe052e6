//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：
//!
//! 1. 代码内的默认值
//! 2. TOML 配置文件
//! 3. `JOBHUB_` 前缀的环境变量，嵌套键用 `__` 分隔，例如
//!    `JOBHUB_CONCURRENCY__MAX_PARALLEL_ACCOUNTS=8`
//!
//! ```rust,ignore
//! use jobhub_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/jobhub.toml"))?;
//! println!("lease = {:?}", config.orchestrator.lease_for(JobKind::Warmup));
//! ```

pub mod models;

pub use models::*;
