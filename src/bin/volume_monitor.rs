//! Bithumb 成交量放量监控服务
//!
//! 加载配置、初始化日志后，按配置执行一次或持续监控；Ctrl+C / SIGTERM 触发停止。

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use kline_volume_alert::klcommon::config::constants::DEFAULT_CONFIG_PATH;
use kline_volume_alert::klcommon::logging_setup::init_logging;
use kline_volume_alert::klcommon::{BithumbApi, DiscordWebhook, MonitorConfig};
use kline_volume_alert::klmonitor::MonitorRunner;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const LOG_TARGET: &str = "VolumeMonitor";

#[tokio::main]
async fn main() -> Result<()> {
    let default_config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let matches = Command::new("volume_monitor")
        .about("Bithumb 成交量放量监控，发现放量时推送 Discord 告警")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("配置文件路径，文件不存在时使用默认值和环境变量")
                .default_value(default_config_path),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("只执行一次监控周期")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let mut config = MonitorConfig::load(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path))?;
    if matches.get_flag("once") {
        config.run_once = true;
    }

    let _guard = init_logging(&config.logging).context("初始化日志系统失败")?;
    info!(target: LOG_TARGET, config_path = %config_path, "配置加载完成");

    if let Err(e) = config.validate() {
        error!(target: LOG_TARGET, "配置验证失败，程序退出");
        return Err(e.into());
    }

    let exchange = BithumbApi::new(config.api_url.clone(), config.api_timeout())?;
    let notifier = DiscordWebhook::new(
        config.webhook_url.clone(),
        config.quote_currency.clone(),
        config.webhook_timeout(),
    )?;

    let run_once = config.run_once;
    let mut runner = MonitorRunner::new(config, exchange, notifier);

    if run_once {
        info!(target: LOG_TARGET, "单次执行模式");
        let report = runner.run_once().await;
        info!(
            target: LOG_TARGET,
            symbols_checked = report.symbols_checked,
            spikes_detected = report.spikes_detected,
            alerts_sent = report.alerts_sent,
            "单次监控完成"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    runner.run_continuous(shutdown).await;
    info!(target: LOG_TARGET, "服务已停止");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(target: LOG_TARGET, "安装Ctrl+C处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(target: LOG_TARGET, "安装SIGTERM处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(target: LOG_TARGET, signal = "Ctrl+C", "收到Ctrl+C信号");
        },
        _ = terminate => {
            info!(target: LOG_TARGET, signal = "SIGTERM", "收到SIGTERM信号");
        },
    }
}
