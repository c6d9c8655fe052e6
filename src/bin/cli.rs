use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobhub::cleanup::{cleanup_locks, render_report, OutputFormat};
use jobhub::common::{init_logging, load_config, LogSink};
use jobhub_infrastructure::{DatabaseManager, SweepOptions};

/// 维护命令行工具
#[derive(Parser, Debug)]
#[command(name = "jobhub-cli")]
#[command(version)]
#[command(about = "作业编排服务 - 维护命令行工具")]
struct CliApp {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 覆盖配置中的数据库地址
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// 输出格式
    #[arg(long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 清理过期的任务锁
    CleanupLocks(CleanupArgs),
}

#[derive(Args, Debug)]
struct CleanupArgs {
    /// 只处理该持有者的锁
    #[arg(long)]
    worker_id: Option<String>,
    /// 同时清理超过 --max-age 秒未续约的锁，即使尚未过期
    #[arg(long)]
    force: bool,
    /// 只列出候选，不做删除
    #[arg(long)]
    dry_run: bool,
    /// 未续约时长阈值（秒），配合 --force 使用
    #[arg(long, default_value_t = 3600)]
    max_age: i64,
    /// 每批处理的锁数量
    #[arg(long, default_value_t = 100)]
    batch_size: u32,
}

impl CleanupArgs {
    fn options(&self) -> Result<SweepOptions> {
        if self.max_age <= 0 {
            return Err(anyhow::anyhow!("--max-age 必须大于0"));
        }
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("--batch-size 必须大于0"));
        }
        let max_age = chrono::TimeDelta::try_seconds(self.max_age)
            .ok_or_else(|| anyhow::anyhow!("--max-age 超出范围: {}", self.max_age))?;
        Ok(SweepOptions {
            worker_id: self.worker_id.clone(),
            force: self.force,
            dry_run: self.dry_run,
            max_age,
            batch_size: self.batch_size,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("warn", "compact", LogSink::Stderr)?;

    let cli = CliApp::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }

    match &cli.command {
        Commands::CleanupLocks(args) => {
            let options = args.options()?;
            let db = DatabaseManager::new(&config.database)
                .await
                .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
            db.migrate().await.context("执行数据库迁移失败")?;
            let report = cleanup_locks(&db, &config.maintenance, &options)
                .await
                .context("清理任务锁失败")?;
            db.close().await;
            println!("{}", render_report(&report, cli.output)?);
        }
    }

    Ok(())
}
