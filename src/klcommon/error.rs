use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Notify error: {0}")]
    NotifyError(String),

    #[error("URL parsing error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl AppError {
    /// 获取错误类型的简洁摘要，用作日志的 `error.summary` 字段
    pub fn get_error_type_summary(&self) -> &'static str {
        match self {
            // 行情获取
            AppError::ApiError(_) => "market_data_acquisition_failed",
            AppError::HttpError(_) => "market_data_connection_failed",

            // 行情解析
            AppError::JsonError(_) => "market_data_parsing_failed",
            AppError::DataError(_) => "candle_data_invalid",

            // 告警推送
            AppError::NotifyError(_) => "alert_delivery_failed",

            // 配置
            AppError::ConfigError(_) => "monitor_configuration_invalid",
            AppError::TomlError(_) => "monitor_config_file_invalid",
            AppError::UrlParseError(_) => "endpoint_url_invalid",

            AppError::IoError(_) => "file_operation_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_summary_is_stable() {
        assert_eq!(
            AppError::ApiError("x".into()).get_error_type_summary(),
            "market_data_acquisition_failed"
        );
        assert_eq!(
            AppError::ConfigError("x".into()).get_error_type_summary(),
            "monitor_configuration_invalid"
        );
    }
}
