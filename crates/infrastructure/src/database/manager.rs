use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jobhub_core::{
    config::DatabaseConfig,
    traits::{LockRepository, WorkerRepository},
    SchedulerError, SchedulerResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::sqlite::{SqliteLockRepository, SqliteWorkerRepository};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "create job_locks",
        r#"
        CREATE TABLE IF NOT EXISTS job_locks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            task_id INTEGER NOT NULL,
            worker_id TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (kind, task_id)
        )
        "#,
    ),
    (
        "index job_locks.expires_at",
        "CREATE INDEX IF NOT EXISTS idx_job_locks_expires_at ON job_locks (expires_at)",
    ),
    (
        "index job_locks.worker_id",
        "CREATE INDEX IF NOT EXISTS idx_job_locks_worker_id ON job_locks (worker_id)",
    ),
    (
        "index job_locks.acquired_at",
        "CREATE INDEX IF NOT EXISTS idx_job_locks_acquired_at ON job_locks (acquired_at)",
    ),
    (
        "create workers",
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            base_url TEXT NOT NULL UNIQUE,
            capacity INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_heartbeat TEXT NOT NULL,
            last_error TEXT,
            registered_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "index workers.last_heartbeat",
        "CREATE INDEX IF NOT EXISTS idx_workers_last_heartbeat ON workers (last_heartbeat)",
    ),
];

/// SQLite连接池与仓储工厂
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));
        let options = if config.url.contains(":memory:") {
            options
        } else {
            options.journal_mode(SqliteJournalMode::Wal)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
            .connect_with(options)
            .await?;

        info!("数据库连接池已创建: {}", config.url);
        Ok(Self { pool })
    }

    /// 单连接的内存数据库，多个连接会各自得到独立的内存库
    pub async fn in_memory() -> SchedulerResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 建表与索引，可重复执行
    pub async fn migrate(&self) -> SchedulerResult<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::query(sql).execute(&self.pool).await.map_err(|e| {
                SchedulerError::DatabaseOperation(format!("执行迁移 {name} 失败: {e}"))
            })?;
            debug!("迁移完成: {}", name);
        }
        Ok(())
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn lock_repository(&self) -> Arc<dyn LockRepository> {
        Arc::new(SqliteLockRepository::new(self.pool.clone()))
    }

    pub fn worker_repository(&self) -> Arc<dyn WorkerRepository> {
        Arc::new(SqliteWorkerRepository::new(self.pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_manager_is_migrated() {
        let manager = DatabaseManager::in_memory().await.unwrap();
        assert!(manager.health_check().await.is_ok());

        // 重复迁移不报错
        manager.migrate().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('job_locks', 'workers') ORDER BY name",
        )
        .fetch_all(manager.pool())
        .await
        .unwrap();
        assert_eq!(
            tables.into_iter().map(|(name,)| name).collect::<Vec<_>>(),
            vec!["job_locks".to_string(), "workers".to_string()]
        );

        manager.close().await;
    }

    #[tokio::test]
    async fn test_file_database_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("jobhub.db").display()),
            ..DatabaseConfig::default()
        };

        let manager = DatabaseManager::new(&config).await.unwrap();
        manager.migrate().await.unwrap();
        assert!(manager.health_check().await.is_ok());
        manager.close().await;
    }
}
