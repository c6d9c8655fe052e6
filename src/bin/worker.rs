use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use jobhub::common::{init_logging, load_config, wait_for_shutdown_signal, LogSink};
use jobhub::shutdown::ShutdownManager;
use jobhub_core::WorkerRegistration;
use jobhub_worker::{claim_routes, ClaimState, ControlPlaneClient, HeartbeatManager, WorkDistributor};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("jobhub-worker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("作业编排服务 - Worker代理")
        .long_about("向控制面注册本Worker并周期性发送心跳")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("control-plane")
                .long("control-plane")
                .value_name("URL")
                .help("控制面地址"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("本Worker对外暴露的地址"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("认领接口监听地址"),
        )
        .arg(
            Arg::new("capacity")
                .long("capacity")
                .value_name("COUNT")
                .help("Worker容量")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["json", "pretty", "compact"]),
        )
        .get_matches();

    let mut config = load_config(matches.get_one::<String>("config").map(String::as_str))?;
    if let Some(url) = matches.get_one::<String>("control-plane") {
        config.worker.control_plane_url = url.clone();
    }
    if let Some(url) = matches.get_one::<String>("base-url") {
        config.worker.base_url = url.clone();
    }
    if let Some(addr) = matches.get_one::<String>("listen") {
        config.worker.listen_address = addr.clone();
    }
    if let Some(capacity) = matches.get_one::<i32>("capacity") {
        config.worker.capacity = *capacity;
    }
    config.worker.validate().context("Worker配置无效")?;

    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());
    init_logging(&config.observability.log_level, &log_format, LogSink::Stdout)?;

    let worker = &config.worker;
    let client = Arc::new(
        ControlPlaneClient::new(&worker.control_plane_url, Duration::from_secs(10))
            .context("创建控制面客户端失败")?,
    );
    let registration = WorkerRegistration {
        base_url: worker.base_url.clone(),
        name: worker.name.clone(),
        capacity: worker.capacity,
    };
    let heartbeat = Arc::new(HeartbeatManager::new(
        client,
        registration,
        Duration::from_secs(worker.heartbeat_interval_seconds),
    ));

    let distributor = WorkDistributor::from_config(&config.distribution)
        .context("创建素材分配器失败")?;
    let listener = tokio::net::TcpListener::bind(&worker.listen_address)
        .await
        .with_context(|| format!("绑定认领接口地址失败: {}", worker.listen_address))?;

    let shutdown_manager = ShutdownManager::new();
    let heartbeat_handle = heartbeat.clone().start(shutdown_manager.subscribe());

    let routes = claim_routes(ClaimState {
        distributor: Arc::new(distributor),
        heartbeat,
    });
    let mut server_shutdown = shutdown_manager.subscribe();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, routes)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            error!("认领接口运行失败: {e}");
        }
    });
    info!(
        "Worker代理已启动: {} (认领接口: {})",
        worker.base_url, worker.listen_address
    );

    wait_for_shutdown_signal().await;
    shutdown_manager.shutdown();
    shutdown_manager
        .drain("心跳任务", heartbeat_handle, Duration::from_secs(5))
        .await;
    shutdown_manager
        .drain("认领接口", server_handle, Duration::from_secs(5))
        .await;

    info!("Worker代理已退出");
    Ok(())
}
