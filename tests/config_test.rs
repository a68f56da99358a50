// 配置文件加载测试
use kline_volume_alert::klcommon::{AppError, CandleInterval, MonitorConfig};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

// 在临时目录写入配置文件
fn write_config(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("kline_volume_alert_config_test");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_full_toml_file() {
    let path = write_config(
        "full.toml",
        r#"
webhook_url = "https://discord.com/api/webhooks/123/abc"
check_interval_secs = 120
volume_multiplier = 3.5
sma_period = 30
candle_interval = "15m"
api_timeout_secs = 5
webhook_timeout_secs = 8
api_delay_secs = 0.25
alert_reset_hours = 6

[logging]
log_level = "debug"
log_file = "logs/test_monitor.log"
enable_console_output = false
"#,
    );

    let config = MonitorConfig::from_file(&path).unwrap();

    assert_eq!(config.check_interval_secs, 120);
    assert_eq!(config.volume_multiplier, 3.5);
    assert_eq!(config.sma_period, 30);
    assert_eq!(config.candle_interval, CandleInterval::M15);
    assert_eq!(config.api_delay_secs, 0.25);
    assert_eq!(config.alert_reset_hours, Some(6));
    assert_eq!(config.logging.log_level, "debug");
    assert!(!config.logging.enable_console_output);
    assert_eq!(config.candle_fetch_count(), 60);
    assert_eq!(config.alert_reset_period(), Some(chrono::Duration::hours(6)));
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_uses_defaults() {
    let path = write_config(
        "partial.toml",
        r#"webhook_url = "https://discord.com/api/webhooks/1/x""#,
    );

    let config = MonitorConfig::from_file(&path).unwrap();

    assert_eq!(config.check_interval_secs, 300);
    assert_eq!(config.volume_multiplier, 5.0);
    assert_eq!(config.sma_period, 20);
    assert_eq!(config.candle_interval, CandleInterval::M5);
    assert_eq!(config.quote_currency, "KRW");
    assert_eq!(config.alert_reset_hours, None);
    assert!(!config.run_once);
    assert!(config.validate().is_ok());
}

#[test]
fn test_unknown_interval_in_file_is_rejected() {
    let path = write_config("bad_interval.toml", r#"candle_interval = "2m""#);
    let err = MonitorConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, AppError::TomlError(_)));
}

#[test]
fn test_environment_overrides_file_values() {
    let path = write_config(
        "override.toml",
        r#"
webhook_url = "https://discord.com/api/webhooks/1/file"
sma_period = 30
"#,
    );
    let env: HashMap<&str, &str> = [
        ("SMA_PERIOD", "10"),
        ("CANDLE_INTERVAL", "1h"),
        ("RUN_ONCE", "TRUE"),
    ]
    .into_iter()
    .collect();

    let mut config = MonitorConfig::from_file(&path).unwrap();
    config
        .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.webhook_url, "https://discord.com/api/webhooks/1/file");
    assert_eq!(config.sma_period, 10);
    assert_eq!(config.candle_interval, CandleInterval::H1);
    assert!(config.run_once);
}

#[test]
fn test_oversized_api_delay_fails_validation() {
    let path = write_config(
        "huge_delay.toml",
        r#"
webhook_url = "https://discord.com/api/webhooks/1/x"
api_delay_secs = 1e20
"#,
    );
    let config = MonitorConfig::from_file(&path).unwrap();

    assert!(matches!(config.validate(), Err(AppError::ConfigError(msg)) if msg.contains("API_DELAY")));
}

#[test]
fn test_missing_webhook_fails_validation() {
    let path = write_config("no_webhook.toml", "check_interval_secs = 30");
    let config = MonitorConfig::from_file(&path).unwrap();

    match config.validate() {
        Err(AppError::ConfigError(msg)) => {
            assert!(msg.contains("DISCORD_WEBHOOK_URL"));
            assert!(msg.contains("CHECK_INTERVAL"));
        }
        other => panic!("expected config error, got {:?}", other),
    }
}
