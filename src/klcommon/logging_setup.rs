//! 日志系统初始化模块
//!
//! 只在程序入口调用一次；各组件通过 `tracing` 宏按 target 输出，不持有全局日志状态。

use crate::klcommon::{AppError, LoggingConfig, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 组装日志过滤器字符串，压低第三方HTTP库的噪音
pub fn build_filter_string(log_level: &str) -> String {
    format!("{},hyper=warn,reqwest=warn", log_level)
}

/// 初始化日志系统：控制台 + 文件双输出
///
/// 返回的 guard 必须由 main 持有到程序结束，否则文件日志可能丢失。
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let log_path = Path::new(&config.log_file);

    // 确保日志目录存在
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = log_path
        .file_name()
        .ok_or_else(|| AppError::ConfigError(format!("日志文件路径无效: {}", config.log_file)))?;
    let directory = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let file_appender = tracing_appender::rolling::never(directory, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter_str = build_filter_string(&config.log_level);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(EnvFilter::new(&filter_str));

    let console_layer = config.enable_console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(EnvFilter::new(&filter_str))
    });

    // try_init 同时安装 log -> tracing 桥接，第三方库的 log 记录也会走同一套过滤器
    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| AppError::ConfigError(format!("日志系统初始化失败: {}", e)))?;

    tracing::info!(target: "logging", log_file = %log_path.display(), "日志系统初始化完成");
    Ok(guard)
}
