use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use rotation::app::{AppMode, Application};
use rotation::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use rotation_config::{AppConfig, LogFormat};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("rotation")
        .version(env!("CARGO_PKG_VERSION"))
        .about("共享职责任务轮值系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时依次查找默认位置"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["api", "sweeper", "all", "sweep-once"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    let config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = match matches.get_one::<String>("log-format").map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some(_) => LogFormat::Pretty,
        None => config.observability.log_format,
    };
    init_logging(&log_level, log_format)?;

    info!("启动共享职责任务轮值系统");
    info!("运行模式: {mode_str}");

    let app_mode = parse_app_mode(mode_str, &config)?;

    if config.observability.metrics_enabled && app_mode != AppMode::SweepOnce {
        init_metrics(&config.observability.metrics_bind_address)?;
    }

    let app = Application::new(config, app_mode).await?;

    if app_mode == AppMode::SweepOnce {
        let report = app.sweep_once().await;
        app.close().await;
        let report = report?;
        info!(
            "提醒扫描完成: 扫描 {} 个，到期 {} 个，发送 {} 个，跳过 {} 个，失败 {} 个",
            report.scanned,
            report.due,
            report.sent,
            report.skipped,
            report.failures.len()
        );
        return Ok(());
    }

    let shutdown_manager = ShutdownManager::new();

    let app = Arc::new(app);
    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {:#}", e);
            }
        })
    };

    wait_for_shutdown_signal().await;

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    app.close().await;
    info!("共享职责任务轮值系统已退出");
    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于命令行和配置
fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// 安装 Prometheus 指标导出器
fn init_metrics(bind_address: &str) -> Result<()> {
    let address: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus指标导出器失败: {}", e))?;

    info!("Prometheus指标导出器监听 {}", address);
    Ok(())
}

/// 解析应用运行模式
fn parse_app_mode(mode_str: &str, config: &AppConfig) -> Result<AppMode> {
    match mode_str {
        "api" => {
            if !config.api.enabled {
                return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
            }
            Ok(AppMode::Api)
        }
        "sweeper" => {
            if !config.scheduler.enabled {
                return Err(anyhow::anyhow!("提醒扫描被禁用，请检查配置"));
            }
            Ok(AppMode::Sweeper)
        }
        "all" => Ok(AppMode::All),
        "sweep-once" => Ok(AppMode::SweepOnce),
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}
