use chrono::Duration;
use jobhub_core::config::DatabaseConfig;
use jobhub_core::{JobKind, LockFilter, SchedulerError};
use jobhub_infrastructure::DatabaseManager;
use tempfile::TempDir;

/// 两个独立连接池共享同一个数据库文件，模拟两个编排进程
async fn two_nodes() -> (TempDir, DatabaseManager, DatabaseManager) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("locks.db").display()),
        max_connections: 4,
        ..DatabaseConfig::default()
    };
    let node_a = DatabaseManager::new(&config).await.unwrap();
    node_a.migrate().await.unwrap();
    let node_b = DatabaseManager::new(&config).await.unwrap();
    (dir, node_a, node_b)
}

#[tokio::test]
async fn test_concurrent_acquire_across_pools() {
    let (_dir, node_a, node_b) = two_nodes().await;
    let repo_a = node_a.lock_repository();
    let repo_b = node_b.lock_repository();

    let (a, b) = tokio::join!(
        repo_a.acquire(JobKind::BulkLogin, 42, "node-a", Duration::minutes(10)),
        repo_b.acquire(JobKind::BulkLogin, 42, "node-b", Duration::minutes(10)),
    );

    let results = [a, b];
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let holder = winners[0].worker_id.clone();

    let conflict = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    match conflict {
        SchedulerError::LockConflict { holder: reported, .. } => assert_eq!(reported, &holder),
        other => panic!("unexpected error: {other}"),
    }

    let locks = repo_a.list(&LockFilter::default()).await.unwrap();
    assert_eq!(locks.len(), 1);
}

#[tokio::test]
async fn test_release_hands_task_to_other_node() {
    let (_dir, node_a, node_b) = two_nodes().await;
    let repo_a = node_a.lock_repository();
    let repo_b = node_b.lock_repository();

    let lock = repo_a
        .acquire(JobKind::Follow, 7, "node-a", Duration::minutes(10))
        .await
        .unwrap();
    assert!(repo_b
        .acquire(JobKind::Follow, 7, "node-b", Duration::minutes(10))
        .await
        .is_err());

    repo_a.release(lock.id).await.unwrap();
    let taken = repo_b
        .acquire(JobKind::Follow, 7, "node-b", Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(taken.worker_id, "node-b");
    assert_ne!(taken.id, lock.id);
}

#[tokio::test]
async fn test_stale_owner_cannot_renew_after_takeover() {
    let (_dir, node_a, node_b) = two_nodes().await;
    let repo_a = node_a.lock_repository();
    let repo_b = node_b.lock_repository();

    let stale = repo_a
        .acquire(JobKind::Avatar, 3, "node-a", Duration::milliseconds(50))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let fresh = repo_b
        .acquire(JobKind::Avatar, 3, "node-b", Duration::minutes(10))
        .await
        .unwrap();
    assert_ne!(fresh.id, stale.id);

    assert!(!repo_a.renew(stale.id, Duration::minutes(10)).await.unwrap());
    // 旧持有者的释放不影响新锁
    repo_a.release(stale.id).await.unwrap();
    assert_eq!(
        repo_b.get(JobKind::Avatar, 3).await.unwrap().map(|l| l.id),
        Some(fresh.id)
    );
}
