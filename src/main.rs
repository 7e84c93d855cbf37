use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

use cronmesh_core::{init_logging, AppConfig, ObservabilityConfig};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::{wait_for_shutdown_signal, ShutdownManager};

/// 分布式Cron任务调度系统
#[derive(Debug, Parser)]
#[command(name = "cronmesh", version, about = "分布式Cron任务调度系统")]
struct Cli {
    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 运行模式
    #[arg(short, long, value_enum, default_value = "standalone")]
    mode: AppMode,

    /// 日志级别，覆盖配置文件
    #[arg(short = 'l', long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| {
        format!(
            "加载配置文件失败: {}",
            cli.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format;
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动分布式Cron任务调度系统");
    info!("运行模式: {:?}", cli.mode);

    if config.observability.metrics_enabled {
        init_metrics(&config.observability)?;
    }

    let app = Arc::new(Application::new(config, cli.mode).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("收到关闭信号，开始优雅关闭...");
        }
        _ = wait_until_finished(&app_handle) => {
            warn!("应用提前退出");
        }
    }
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用运行失败: {:#}", e),
        Ok(Err(e)) => error!("应用任务异常退出: {}", e),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式Cron任务调度系统已退出");
    Ok(())
}

async fn wait_until_finished<T>(handle: &tokio::task::JoinHandle<T>) {
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// 安装Prometheus指标导出器
fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let addr: SocketAddr = config
        .metrics_bind_address
        .parse()
        .with_context(|| format!("指标监听地址无效: {}", config.metrics_bind_address))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus指标导出器失败: {}", e))?;

    info!("Prometheus指标导出器已启动: http://{}/metrics", addr);
    Ok(())
}
