use async_trait::async_trait;
use chrono::{Duration, Utc};
use jobhub_core::{
    models::{JobKind, Lock, LockFilter, SweepCriteria},
    traits::LockRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, warn};

const LOCK_COLUMNS: &str = "id, kind, task_id, worker_id, acquired_at, expires_at, updated_at";

pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_lock(row: &SqliteRow) -> SchedulerResult<Lock> {
        Ok(Lock {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            task_id: row.try_get("task_id")?,
            worker_id: row.try_get("worker_id")?,
            acquired_at: row.try_get("acquired_at")?,
            expires_at: row.try_get("expires_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// 追加清理条件，`delete_candidates` 删除时复用同一条件做二次校验
    fn push_sweep_criteria(builder: &mut QueryBuilder<'_, Sqlite>, criteria: &SweepCriteria) {
        builder.push(" WHERE (expires_at < ");
        builder.push_bind(criteria.now);
        if let Some(cutoff) = criteria.stale_before {
            builder.push(" OR updated_at < ");
            builder.push_bind(cutoff);
        }
        builder.push(")");
        if let Some(worker_id) = &criteria.worker_id {
            builder.push(" AND worker_id = ");
            builder.push_bind(worker_id.clone());
        }
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn acquire(
        &self,
        kind: JobKind,
        task_id: i64,
        worker_id: &str,
        lease: Duration,
    ) -> SchedulerResult<Lock> {
        let now = Utc::now();
        let expires_at = now + lease;

        let mut tx = self.pool.begin().await?;

        // 过期的他人锁先删除，之后的插入获得新的锁ID
        let reclaimed = sqlx::query(
            "DELETE FROM job_locks WHERE kind = ? AND task_id = ? AND expires_at < ? AND worker_id <> ?",
        )
        .bind(kind)
        .bind(task_id)
        .bind(now)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        if reclaimed.rows_affected() > 0 {
            warn!("回收过期任务锁: {}/{} -> {}", kind, task_id, worker_id);
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO job_locks (kind, task_id, worker_id, acquired_at, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, task_id) DO UPDATE SET
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            WHERE job_locks.worker_id = excluded.worker_id
            RETURNING {LOCK_COLUMNS}
            "#
        ))
        .bind(kind)
        .bind(task_id)
        .bind(worker_id)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        match row {
            Some(row) => {
                let lock = Self::row_to_lock(&row)?;
                tx.commit().await?;
                debug!(
                    "获取任务锁成功: {}/{} lock_id={} holder={}",
                    kind, task_id, lock.id, worker_id
                );
                Ok(lock)
            }
            None => {
                let holder: Option<String> = sqlx::query_scalar(
                    "SELECT worker_id FROM job_locks WHERE kind = ? AND task_id = ?",
                )
                .bind(kind)
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.rollback().await?;
                Err(SchedulerError::lock_conflict(
                    kind,
                    task_id,
                    holder.unwrap_or_else(|| "unknown".to_string()),
                ))
            }
        }
    }

    async fn renew(&self, lock_id: i64, lease: Duration) -> SchedulerResult<bool> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE job_locks SET expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(now + lease)
            .bind(now)
            .bind(lock_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, lock_id: i64) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM job_locks WHERE id = ?")
            .bind(lock_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!("任务锁已不存在: {}", lock_id);
        }
        Ok(())
    }

    async fn get(&self, kind: JobKind, task_id: i64) -> SchedulerResult<Option<Lock>> {
        let row = sqlx::query(&format!(
            "SELECT {LOCK_COLUMNS} FROM job_locks WHERE kind = ? AND task_id = ?"
        ))
        .bind(kind)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_lock).transpose()
    }

    async fn get_by_id(&self, lock_id: i64) -> SchedulerResult<Option<Lock>> {
        let row = sqlx::query(&format!("SELECT {LOCK_COLUMNS} FROM job_locks WHERE id = ?"))
            .bind(lock_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_lock).transpose()
    }

    async fn list(&self, filter: &LockFilter) -> SchedulerResult<Vec<Lock>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {LOCK_COLUMNS} FROM job_locks WHERE 1 = 1"));
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind);
        }
        if let Some(worker_id) = &filter.worker_id {
            builder.push(" AND worker_id = ");
            builder.push_bind(worker_id.clone());
        }
        if filter.expired_only {
            builder.push(" AND expires_at < ");
            builder.push_bind(Utc::now());
        }
        builder.push(" ORDER BY acquired_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_lock).collect()
    }

    async fn find_sweep_candidates(
        &self,
        criteria: &SweepCriteria,
        after_id: Option<i64>,
        limit: u32,
    ) -> SchedulerResult<Vec<Lock>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {LOCK_COLUMNS} FROM job_locks"));
        Self::push_sweep_criteria(&mut builder, criteria);
        if let Some(after_id) = after_id {
            builder.push(" AND id > ");
            builder.push_bind(after_id);
        }
        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_lock).collect()
    }

    async fn delete_candidates(
        &self,
        criteria: &SweepCriteria,
        lock_ids: &[i64],
    ) -> SchedulerResult<u64> {
        if lock_ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM job_locks");
        Self::push_sweep_criteria(&mut builder, criteria);
        builder.push(" AND id IN (");
        let mut ids = builder.separated(", ");
        for id in lock_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
