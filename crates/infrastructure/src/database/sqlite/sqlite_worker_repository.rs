use async_trait::async_trait;
use chrono::{Duration, Utc};
use jobhub_core::{
    models::{WorkerNode, WorkerRegistration},
    traits::WorkerRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const WORKER_COLUMNS: &str =
    "id, name, base_url, capacity, is_active, last_heartbeat, last_error, registered_at";

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &SqliteRow) -> SchedulerResult<WorkerNode> {
        Ok(WorkerNode {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            base_url: row.try_get("base_url")?,
            capacity: row.try_get("capacity")?,
            is_active: row.try_get("is_active")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            last_error: row.try_get("last_error")?,
            registered_at: row.try_get("registered_at")?,
        })
    }

    /// 校验注册信息，返回规范化后的地址与名称
    fn normalize(registration: &WorkerRegistration) -> SchedulerResult<(String, String)> {
        let url = Url::parse(&registration.base_url).map_err(|e| {
            SchedulerError::Validation(format!("无效的Worker地址 {}: {e}", registration.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SchedulerError::Validation(format!(
                "Worker地址必须是http(s)协议: {}",
                registration.base_url
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            SchedulerError::Validation(format!("Worker地址缺少主机名: {}", registration.base_url))
        })?;
        if registration.capacity <= 0 {
            return Err(SchedulerError::Validation(format!(
                "Worker容量必须大于0: {}",
                registration.capacity
            )));
        }

        let name = match registration.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            },
        };
        let base_url = registration.base_url.trim_end_matches('/').to_string();
        Ok((base_url, name))
    }

    fn ensure_found(rows_affected: u64, worker_id: &str) -> SchedulerResult<()> {
        if rows_affected == 0 {
            return Err(SchedulerError::WorkerNotFound {
                id: worker_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn register(&self, registration: &WorkerRegistration) -> SchedulerResult<String> {
        let (base_url, name) = Self::normalize(registration)?;
        let now = Utc::now();

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO workers (id, name, base_url, capacity, is_active, last_heartbeat, last_error, registered_at)
            VALUES (?, ?, ?, ?, 1, ?, NULL, ?)
            ON CONFLICT(base_url) DO UPDATE SET
                name = excluded.name,
                capacity = excluded.capacity,
                is_active = 1,
                last_heartbeat = excluded.last_heartbeat,
                last_error = NULL
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name)
        .bind(&base_url)
        .bind(registration.capacity)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!("注册Worker成功: {} ({}) capacity={}", id, base_url, registration.capacity);
        Ok(id)
    }

    async fn heartbeat(&self, worker_id: &str) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE workers SET is_active = 1, last_heartbeat = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Self::ensure_found(result.rows_affected(), worker_id)?;
        debug!("Worker心跳: {}", worker_id);
        Ok(())
    }

    async fn report_error(&self, worker_id: &str, message: &str) -> SchedulerResult<()> {
        // 只记录错误，存活判断只看心跳
        let result = sqlx::query("UPDATE workers SET last_error = ? WHERE id = ?")
            .bind(message)
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Self::ensure_found(result.rows_affected(), worker_id)?;
        debug!("Worker上报错误: {} {}", worker_id, message);
        Ok(())
    }

    async fn deactivate(&self, worker_id: &str) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE workers SET is_active = 0 WHERE id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;
        Self::ensure_found(result.rows_affected(), worker_id)?;
        info!("Worker已下线: {}", worker_id);
        Ok(())
    }

    async fn get(&self, worker_id: &str) -> SchedulerResult<Option<WorkerNode>> {
        let row = sqlx::query(&format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?"))
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_worker).transpose()
    }

    async fn list_all(&self) -> SchedulerResult<Vec<WorkerNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY registered_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn list_active(
        &self,
        min_capacity: i32,
        staleness: Duration,
    ) -> SchedulerResult<Vec<WorkerNode>> {
        let cutoff = Utc::now() - staleness;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {WORKER_COLUMNS} FROM workers
            WHERE is_active = 1 AND capacity >= ? AND last_heartbeat >= ?
            ORDER BY capacity DESC, name ASC
            "#
        ))
        .bind(min_capacity)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    fn registration(base_url: &str, name: Option<&str>, capacity: i32) -> WorkerRegistration {
        WorkerRegistration {
            base_url: base_url.to_string(),
            name: name.map(str::to_string),
            capacity,
        }
    }

    #[tokio::test]
    async fn test_register_upserts_on_base_url() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();

        let id = repo
            .register(&registration("http://10.0.0.1:9000", None, 2))
            .await
            .unwrap();
        let again = repo
            .register(&registration("http://10.0.0.1:9000/", Some("edge-1"), 8))
            .await
            .unwrap();
        assert_eq!(id, again);

        let workers = repo.list_all().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].capacity, 8);
        assert_eq!(workers[0].name, "edge-1");
    }

    #[tokio::test]
    async fn test_name_defaults_to_host_and_port() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();
        let id = repo
            .register(&registration("http://worker.local:9100", None, 1))
            .await
            .unwrap();

        let worker = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(worker.name, "worker.local:9100");
        assert!(worker.is_active);
        assert!(worker.last_error.is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_input() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();

        for bad in [
            registration("not a url", None, 1),
            registration("ftp://10.0.0.1", None, 1),
            registration("http://10.0.0.1:9000", None, 0),
        ] {
            assert!(matches!(
                repo.register(&bad).await,
                Err(SchedulerError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_list_active_ordering_and_filters() {
        let manager = DatabaseManager::in_memory().await.unwrap();
        let repo = manager.worker_repository();

        repo.register(&registration("http://b:9000", Some("b"), 4))
            .await
            .unwrap();
        repo.register(&registration("http://a:9000", Some("a"), 4))
            .await
            .unwrap();
        repo.register(&registration("http://big:9000", Some("z-big"), 16))
            .await
            .unwrap();
        let small = repo
            .register(&registration("http://small:9000", Some("small"), 1))
            .await
            .unwrap();
        let stale = repo
            .register(&registration("http://stale:9000", Some("stale"), 32))
            .await
            .unwrap();
        let off = repo
            .register(&registration("http://off:9000", Some("off"), 32))
            .await
            .unwrap();

        sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(10))
            .bind(&stale)
            .execute(manager.pool())
            .await
            .unwrap();
        repo.deactivate(&off).await.unwrap();

        let active = repo.list_active(2, Duration::seconds(90)).await.unwrap();
        let names: Vec<&str> = active.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["z-big", "a", "b"]);
        assert!(active.iter().all(|w| w.id != small));

        // 心跳恢复后重新参与调度
        repo.heartbeat(&stale).await.unwrap();
        let active = repo.list_active(2, Duration::seconds(90)).await.unwrap();
        assert_eq!(active[0].name, "stale");
    }

    #[tokio::test]
    async fn test_unknown_worker_operations() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();

        assert!(matches!(
            repo.heartbeat("missing").await,
            Err(SchedulerError::WorkerNotFound { .. })
        ));
        assert!(matches!(
            repo.report_error("missing", "boom").await,
            Err(SchedulerError::WorkerNotFound { .. })
        ));
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_report_error_is_recorded() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();
        let id = repo
            .register(&registration("http://10.0.0.2:9000", None, 2))
            .await
            .unwrap();

        repo.report_error(&id, "proxy refused connection")
            .await
            .unwrap();
        let worker = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(
            worker.last_error.as_deref(),
            Some("proxy refused connection")
        );
    }

    #[tokio::test]
    async fn test_report_error_does_not_refresh_liveness() {
        let manager = DatabaseManager::in_memory().await.unwrap();
        let repo = manager.worker_repository();
        let id = repo
            .register(&registration("http://10.0.0.3:9000", None, 2))
            .await
            .unwrap();

        sqlx::query("UPDATE workers SET last_heartbeat = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(10))
            .bind(&id)
            .execute(manager.pool())
            .await
            .unwrap();
        assert!(repo.list_active(1, Duration::seconds(60)).await.unwrap().is_empty());

        repo.report_error(&id, "connection refused").await.unwrap();
        assert!(repo.list_active(1, Duration::seconds(60)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reregister_clears_last_error() {
        let repo = DatabaseManager::in_memory().await.unwrap().worker_repository();
        let id = repo
            .register(&registration("http://10.0.0.4:9000", None, 2))
            .await
            .unwrap();
        repo.report_error(&id, "browser crashed").await.unwrap();

        let again = repo
            .register(&registration("http://10.0.0.4:9000", None, 2))
            .await
            .unwrap();
        assert_eq!(id, again);
        assert!(repo.get(&id).await.unwrap().unwrap().last_error.is_none());
    }
}
