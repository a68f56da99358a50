// 导出共享模块
pub mod api;
pub mod config;
pub mod error;
pub mod logging_setup;
pub mod models;
pub mod notifier;

// 重新导出常用类型，方便使用
pub use api::{BithumbApi, ExchangeClient};
pub use config::{CandleInterval, LoggingConfig, MonitorConfig};
pub use error::{AppError, Result};
pub use models::{Candle, CandleSeries, SpikeAnalysis, SpikeContext};
pub use notifier::{DiscordWebhook, Notifier};
