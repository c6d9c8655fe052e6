use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use jobhub::app::{resolve_node_id, Application};
use jobhub::cleanup::{cleanup_locks, render_report, OutputFormat};
use jobhub::shutdown::ShutdownManager;
use jobhub_core::{AppConfig, JobKind, LockFilter};
use jobhub_infrastructure::{DatabaseManager, SweepOptions};
use tower::ServiceExt;

async fn seed_lock(db: &DatabaseManager, task_id: i64, worker_id: &str, expires_in: chrono::Duration) {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO job_locks (kind, task_id, worker_id, acquired_at, expires_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(JobKind::MediaDedup)
    .bind(task_id)
    .bind(worker_id)
    .bind(now - chrono::Duration::hours(2))
    .bind(now + expires_in)
    .bind(now - chrono::Duration::minutes(5))
    .execute(db.pool())
    .await
    .unwrap();
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.orchestrator.node_id = "node-test".to_string();
    config.maintenance.enabled = false;
    config
}

#[tokio::test]
async fn test_router_serves_health_and_api() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let app = Application::build(test_config(), db, None).unwrap();
    assert_eq!(app.orchestrator().node_id(), "node-test");

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router()
        .oneshot(Request::builder().uri("/api/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 未安装指标记录器时不挂载 /metrics
    let response = app
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_signal() {
    let mut config = test_config();
    config.api.bind_address = "127.0.0.1:0".to_string();
    let db = DatabaseManager::in_memory().await.unwrap();
    let app = Application::build(config, db, None).unwrap();

    let shutdown = ShutdownManager::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { app.run(rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_disabled_api_does_not_bind() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = test_config();
    config.api.bind_address = occupied.local_addr().unwrap().to_string();

    let db = DatabaseManager::in_memory().await.unwrap();
    let app = Application::build(config.clone(), db, None).unwrap();
    let shutdown = ShutdownManager::new();
    assert!(app.run(shutdown.subscribe()).await.is_err());

    config.api.enabled = false;
    let db = DatabaseManager::in_memory().await.unwrap();
    let app = Application::build(config, db, None).unwrap();
    let shutdown = ShutdownManager::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { app.run(rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cleanup_dry_run_reports_expired_only() {
    let db = DatabaseManager::in_memory().await.unwrap();
    for task_id in 1..=3 {
        seed_lock(&db, task_id, "node-a", chrono::Duration::seconds(-60)).await;
    }
    seed_lock(&db, 4, "node-a", chrono::Duration::hours(1)).await;
    seed_lock(&db, 5, "node-b", chrono::Duration::hours(1)).await;

    let config = test_config();
    let options = SweepOptions {
        dry_run: true,
        ..SweepOptions::default()
    };
    let report = cleanup_locks(&db, &config.maintenance, &options).await.unwrap();
    assert_eq!(report.candidate_count(), 3);
    assert_eq!(report.deleted, 0);

    let remaining = db.lock_repository().list(&LockFilter::default()).await.unwrap();
    assert_eq!(remaining.len(), 5);

    let text = render_report(&report, OutputFormat::Text).unwrap();
    assert!(text.contains("candidates: 3"));
    assert!(text.contains("deleted: 0"));
}

#[tokio::test]
async fn test_cleanup_force_with_worker_filter() {
    let db = DatabaseManager::in_memory().await.unwrap();
    seed_lock(&db, 1, "node-a", chrono::Duration::seconds(-60)).await;
    // 未过期但5分钟未续约
    seed_lock(&db, 2, "node-a", chrono::Duration::hours(1)).await;
    seed_lock(&db, 3, "node-b", chrono::Duration::hours(1)).await;

    let options = SweepOptions {
        worker_id: Some("node-a".to_string()),
        force: true,
        max_age: chrono::Duration::seconds(60),
        ..SweepOptions::default()
    };
    let report = cleanup_locks(&db, &test_config().maintenance, &options)
        .await
        .unwrap();
    assert_eq!(report.deleted, 2);

    let remaining = db.lock_repository().list(&LockFilter::default()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].worker_id, "node-b");
}

#[tokio::test]
async fn test_file_database_is_migrated_on_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.database.url = format!("sqlite://{}?mode=rwc", dir.path().join("jobhub.db").display());
    config.observability.metrics_enabled = false;

    let app = Application::new(config).await.unwrap();
    let locks = app
        .database()
        .lock_repository()
        .list(&LockFilter::default())
        .await
        .unwrap();
    assert!(locks.is_empty());
}

#[test]
fn test_node_id_fallback() {
    assert_eq!(resolve_node_id(" node-7 "), "node-7");
    let generated = resolve_node_id("");
    assert!(generated.ends_with(&format!("-{}", std::process::id())));
}
