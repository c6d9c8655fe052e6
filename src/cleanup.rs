use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::ValueEnum;
use jobhub_core::{config::MaintenanceConfig, SchedulerResult, SweepReport};
use jobhub_infrastructure::{DatabaseManager, LockMaintenanceService, SweepOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// 执行一次任务锁清理
pub async fn cleanup_locks(
    db: &DatabaseManager,
    maintenance: &MaintenanceConfig,
    options: &SweepOptions,
) -> SchedulerResult<SweepReport> {
    LockMaintenanceService::new(db.lock_repository(), maintenance.clone())
        .run_once(options)
        .await
}

pub fn render_report(report: &SweepReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("序列化清理报告失败")
        }
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &SweepReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { "dry-run" } else { "delete" };
    let _ = writeln!(out, "mode: {mode}");
    let _ = writeln!(out, "candidates: {}", report.candidate_count());
    for lock in &report.candidates {
        let _ = writeln!(
            out,
            "  #{} {}/{} holder={} expires_at={} updated_at={}",
            lock.id,
            lock.kind,
            lock.task_id,
            lock.worker_id,
            lock.expires_at.to_rfc3339(),
            lock.updated_at.to_rfc3339()
        );
    }
    let _ = writeln!(out, "deleted: {} (batches: {})", report.deleted, report.batches);
    out
}
