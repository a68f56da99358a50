//! 成交量监控配置模块
//!
//! 配置来源优先级：环境变量 > 配置文件 > 默认值。
//! 启动前统一校验一次，校验失败直接退出，运行期间不再修改。

use crate::klcommon::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::error;

/// 配置常量
pub mod constants {
    /// 默认配置文件路径
    pub const DEFAULT_CONFIG_PATH: &str = "config/VolumeMonitorConfig.toml";

    /// 默认Bithumb公共API地址
    pub const DEFAULT_API_URL: &str = "https://api.bithumb.com/public";

    /// 默认计价货币
    pub const DEFAULT_QUOTE_CURRENCY: &str = "KRW";

    /// 拉取K线时在SMA周期之外多拉的数量，容忍上游数据缺口
    pub const CANDLE_OVERFETCH_MARGIN: usize = 30;

    /// 告警记录清空周期上限（小时），超出按上限处理
    pub const MAX_ALERT_RESET_HOURS: u64 = 1_000_000;

    /// 最小检查间隔（秒）
    pub const MIN_CHECK_INTERVAL_SECS: u64 = 60;

    /// 品种间请求间隔上限（秒）
    pub const MAX_API_DELAY_SECS: f64 = 60.0;

    /// 支持的K线周期
    pub const SUPPORTED_INTERVALS: &[&str] = &["1m", "3m", "5m", "15m", "30m", "1h", "4h", "1d"];
}

use constants::*;

/// K线周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CandleInterval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::M1 => "1m",
            CandleInterval::M3 => "3m",
            CandleInterval::M5 => "5m",
            CandleInterval::M15 => "15m",
            CandleInterval::M30 => "30m",
            CandleInterval::H1 => "1h",
            CandleInterval::H4 => "4h",
            CandleInterval::D1 => "1d",
        }
    }
}

impl Default for CandleInterval {
    fn default() -> Self {
        CandleInterval::M5
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1m" => Ok(CandleInterval::M1),
            "3m" => Ok(CandleInterval::M3),
            "5m" => Ok(CandleInterval::M5),
            "15m" => Ok(CandleInterval::M15),
            "30m" => Ok(CandleInterval::M30),
            "1h" => Ok(CandleInterval::H1),
            "4h" => Ok(CandleInterval::H4),
            "1d" => Ok(CandleInterval::D1),
            other => Err(AppError::ConfigError(format!(
                "CANDLE_INTERVAL必须是以下之一: {} (当前: {})",
                SUPPORTED_INTERVALS.join(", "),
                other
            ))),
        }
    }
}

impl TryFrom<String> for CandleInterval {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CandleInterval> for String {
    fn from(value: CandleInterval) -> Self {
        value.as_str().to_string()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/volume_monitor.log".to_string()
}

fn default_enable_console_output() -> bool {
    true
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 日志文件路径，父目录不存在时自动创建
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// 是否启用控制台输出
    #[serde(default = "default_enable_console_output")]
    pub enable_console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: default_log_file(),
            enable_console_output: default_enable_console_output(),
        }
    }
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_volume_multiplier() -> f64 {
    5.0
}

fn default_sma_period() -> usize {
    20
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_api_delay_secs() -> f64 {
    0.1
}

fn default_quote_currency() -> String {
    DEFAULT_QUOTE_CURRENCY.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// 成交量监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Discord webhook 地址
    #[serde(default)]
    pub webhook_url: String,

    /// 监控周期间隔（秒）
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// 放量倍数阈值（含边界）
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,

    /// 成交量SMA周期
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,

    /// K线周期
    #[serde(default)]
    pub candle_interval: CandleInterval,

    /// 交易所API请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub api_timeout_secs: u64,

    /// webhook请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub webhook_timeout_secs: u64,

    /// 品种之间的请求间隔（秒）
    #[serde(default = "default_api_delay_secs")]
    pub api_delay_secs: f64,

    /// 告警记录清空周期（小时），为空则不清空
    #[serde(default)]
    pub alert_reset_hours: Option<u64>,

    /// 计价货币
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,

    /// 交易所公共API地址
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// 只执行一次监控周期
    #[serde(default)]
    pub run_once: bool,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            check_interval_secs: default_check_interval_secs(),
            volume_multiplier: default_volume_multiplier(),
            sma_period: default_sma_period(),
            candle_interval: CandleInterval::default(),
            api_timeout_secs: default_timeout_secs(),
            webhook_timeout_secs: default_timeout_secs(),
            api_delay_secs: default_api_delay_secs(),
            alert_reset_hours: None,
            quote_currency: default_quote_currency(),
            api_url: default_api_url(),
            run_once: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// 解析环境变量中的值，失败时返回配置错误
fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::ConfigError(format!("环境变量 {} 的值无效 ({}): {}", key, raw, e)))
}

impl MonitorConfig {
    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// 加载配置：文件存在则读取文件，否则使用默认值，然后叠加环境变量
    ///
    /// 不做校验，调用方需要再调用 [`MonitorConfig::validate`]。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 用外部提供的键值覆盖配置项
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DISCORD_WEBHOOK_URL") {
            self.webhook_url = v.trim().to_string();
        }
        if let Some(v) = lookup("CHECK_INTERVAL") {
            self.check_interval_secs = parse_env("CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("VOLUME_MULTIPLIER") {
            self.volume_multiplier = parse_env("VOLUME_MULTIPLIER", &v)?;
        }
        if let Some(v) = lookup("SMA_PERIOD") {
            self.sma_period = parse_env("SMA_PERIOD", &v)?;
        }
        if let Some(v) = lookup("CANDLE_INTERVAL") {
            self.candle_interval = v.parse()?;
        }
        if let Some(v) = lookup("API_TIMEOUT") {
            self.api_timeout_secs = parse_env("API_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("WEBHOOK_TIMEOUT") {
            self.webhook_timeout_secs = parse_env("WEBHOOK_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("API_DELAY") {
            self.api_delay_secs = parse_env("API_DELAY", &v)?;
        }
        if let Some(v) = lookup("ALERT_RESET_HOURS") {
            // 空字符串表示不清空
            self.alert_reset_hours = if v.trim().is_empty() {
                None
            } else {
                Some(parse_env("ALERT_RESET_HOURS", &v)?)
            };
        }
        if let Some(v) = lookup("QUOTE_CURRENCY") {
            self.quote_currency = v.trim().to_uppercase();
        }
        if let Some(v) = lookup("BITHUMB_API_URL") {
            self.api_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("RUN_ONCE") {
            self.run_once = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("RUST_LOG") {
            self.logging.log_level = v;
        }
        if let Some(v) = lookup("LOG_FILE") {
            self.logging.log_file = v;
        }
        Ok(())
    }

    /// 验证配置的有效性，收集全部错误后一次性返回
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.webhook_url.is_empty() {
            errors.push("DISCORD_WEBHOOK_URL未设置".to_string());
        } else if let Err(e) = url::Url::parse(&self.webhook_url) {
            errors.push(format!("DISCORD_WEBHOOK_URL格式无效: {}", e));
        }

        if self.check_interval_secs < MIN_CHECK_INTERVAL_SECS {
            errors.push(format!("CHECK_INTERVAL必须至少为{}秒", MIN_CHECK_INTERVAL_SECS));
        }

        if !(self.volume_multiplier.is_finite() && self.volume_multiplier > 0.0) {
            errors.push("VOLUME_MULTIPLIER必须大于0".to_string());
        }

        if self.sma_period < 1 {
            errors.push("SMA_PERIOD必须至少为1".to_string());
        }

        if self.api_timeout_secs < 1 {
            errors.push("API_TIMEOUT必须至少为1秒".to_string());
        }

        if self.webhook_timeout_secs < 1 {
            errors.push("WEBHOOK_TIMEOUT必须至少为1秒".to_string());
        }

        if !(self.api_delay_secs.is_finite() && (0.0..=MAX_API_DELAY_SECS).contains(&self.api_delay_secs)) {
            errors.push(format!("API_DELAY必须在0到{}秒之间", MAX_API_DELAY_SECS));
        }

        if matches!(self.alert_reset_hours, Some(h) if h < 1) {
            errors.push("ALERT_RESET_HOURS必须至少为1小时".to_string());
        }

        if self.quote_currency.trim().is_empty() {
            errors.push("QUOTE_CURRENCY不能为空".to_string());
        }

        if let Err(e) = url::Url::parse(&self.api_url) {
            errors.push(format!("BITHUMB_API_URL格式无效: {}", e));
        }

        if errors.is_empty() {
            return Ok(());
        }

        for e in &errors {
            error!(target: "config", "配置错误: {}", e);
        }
        Err(AppError::ConfigError(errors.join("; ")))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// 品种间请求间隔，未校验的非法值按0处理
    pub fn api_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.api_delay_secs.clamp(0.0, MAX_API_DELAY_SECS)).unwrap_or_default()
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    /// 告警记录清空周期
    pub fn alert_reset_period(&self) -> Option<chrono::Duration> {
        self.alert_reset_hours
            .map(|h| chrono::Duration::hours(h.min(MAX_ALERT_RESET_HOURS) as i64))
    }

    /// 每次拉取的K线数量
    pub fn candle_fetch_count(&self) -> usize {
        self.sma_period + CANDLE_OVERFETCH_MARGIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_config() -> MonitorConfig {
        MonitorConfig {
            webhook_url: "https://discord.com/api/webhooks/1/abc".to_string(),
            ..MonitorConfig::default()
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.check_interval_secs, 300);
        assert_eq!(config.volume_multiplier, 5.0);
        assert_eq!(config.sma_period, 20);
        assert_eq!(config.candle_interval, CandleInterval::M5);
        assert_eq!(config.alert_reset_hours, None);
        assert_eq!(config.candle_fetch_count(), 50);
        assert_eq!(config.api_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = MonitorConfig {
            webhook_url: String::new(),
            check_interval_secs: 59,
            volume_multiplier: 0.0,
            sma_period: 0,
            api_delay_secs: -1.0,
            alert_reset_hours: Some(0),
            ..MonitorConfig::default()
        };
        let err = config.validate().unwrap_err().to_string();
        for key in [
            "DISCORD_WEBHOOK_URL",
            "CHECK_INTERVAL",
            "VOLUME_MULTIPLIER",
            "SMA_PERIOD",
            "API_DELAY",
            "ALERT_RESET_HOURS",
        ] {
            assert!(err.contains(key), "错误信息缺少 {}: {}", key, err);
        }
    }

    #[test]
    fn test_boundary_values_are_accepted() {
        let config = MonitorConfig {
            check_interval_secs: 60,
            sma_period: 1,
            api_delay_secs: 0.0,
            alert_reset_hours: Some(1),
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_api_delay_is_rejected() {
        let config = MonitorConfig {
            api_delay_secs: 1e20,
            ..valid_config()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("API_DELAY"), "{}", err);
        assert_eq!(config.api_delay(), Duration::from_secs(60));

        let at_limit = MonitorConfig {
            api_delay_secs: MAX_API_DELAY_SECS,
            ..valid_config()
        };
        assert!(at_limit.validate().is_ok());

        let nan = MonitorConfig {
            api_delay_secs: f64::NAN,
            ..valid_config()
        };
        assert!(nan.validate().is_err());
        assert_eq!(nan.api_delay(), Duration::ZERO);
    }

    #[test]
    fn test_interval_parsing() {
        for label in SUPPORTED_INTERVALS {
            let interval: CandleInterval = label.parse().unwrap();
            assert_eq!(interval.as_str(), *label);
        }
        assert!("2m".parse::<CandleInterval>().is_err());
        assert!("1w".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = MonitorConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("DISCORD_WEBHOOK_URL", "https://example.com/hook"),
                ("CHECK_INTERVAL", "600"),
                ("VOLUME_MULTIPLIER", "3.5"),
                ("SMA_PERIOD", "30"),
                ("CANDLE_INTERVAL", "1h"),
                ("API_DELAY", "0.25"),
                ("ALERT_RESET_HOURS", "6"),
                ("RUN_ONCE", "TRUE"),
            ]))
            .unwrap();

        assert_eq!(config.webhook_url, "https://example.com/hook");
        assert_eq!(config.check_interval_secs, 600);
        assert_eq!(config.volume_multiplier, 3.5);
        assert_eq!(config.sma_period, 30);
        assert_eq!(config.candle_interval, CandleInterval::H1);
        assert_eq!(config.api_delay_secs, 0.25);
        assert_eq!(config.alert_reset_hours, Some(6));
        assert!(config.run_once);
        assert_eq!(config.candle_fetch_count(), 60);
    }

    #[test]
    fn test_empty_reset_hours_means_never() {
        let mut config = MonitorConfig {
            alert_reset_hours: Some(3),
            ..MonitorConfig::default()
        };
        config
            .apply_overrides(lookup_from(&[("ALERT_RESET_HOURS", "")]))
            .unwrap();
        assert_eq!(config.alert_reset_hours, None);
        assert_eq!(config.alert_reset_period(), None);
    }

    #[test]
    fn test_unparsable_override_is_config_error() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("CHECK_INTERVAL", "five minutes")]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = config
            .apply_overrides(lookup_from(&[("CANDLE_INTERVAL", "2h")]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
