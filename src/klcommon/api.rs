use crate::klcommon::{AppError, Candle, CandleInterval, CandleSeries, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Bithumb 成功响应的状态码
const STATUS_OK: &str = "0000";

const USER_AGENT: &str = "BithumbVolumeAlert/1.0";

/// 交易所行情客户端
///
/// 所有失败（超时、非2xx、接口状态错误、报文格式错误）都以 `Err` 返回，不会panic。
/// 调用方把 `Err` 当作"本次没有拿到数据"处理。
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 获取计价货币市场的全部品种代码，按字典序升序
    async fn list_symbols(&self, quote_currency: &str) -> Result<Vec<String>>;

    /// 获取最近 `count` 根K线，按时间升序
    async fn fetch_candles(
        &self,
        symbol: &str,
        quote_currency: &str,
        interval: CandleInterval,
        count: usize,
    ) -> Result<CandleSeries>;
}

/// Bithumb 公共API客户端
#[derive(Clone, Debug)]
pub struct BithumbApi {
    api_url: String,
    client: Client,
}

impl BithumbApi {
    /// 创建新的API客户端实例
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::ApiError(format!("创建HTTP客户端失败: {}", e)))?;

        debug!(target: "api", endpoint = %api_url, timeout_secs = timeout.as_secs(), "API客户端初始化完成");
        Ok(Self { api_url, client })
    }

    /// 发送GET请求并校验 `status` 字段，返回 `data` 部分
    async fn get_data(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = match self.client.get(url).query(query).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let http_error = AppError::from(e);
                debug!(
                    target: "api",
                    url = %url,
                    timeout = http_error_is_timeout(&http_error),
                    error.summary = http_error.get_error_type_summary(),
                    error.details = %http_error,
                    "HTTP请求失败"
                );
                return Err(http_error);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            let api_error = AppError::ApiError(format!("HTTP状态错误: {} - {}", status, preview));
            debug!(
                target: "api",
                url = %url,
                status = %status,
                error.summary = api_error.get_error_type_summary(),
                "API响应状态错误"
            );
            return Err(api_error);
        }

        let body: Value = response.json().await?;
        extract_data(body)
    }
}

fn http_error_is_timeout(err: &AppError) -> bool {
    matches!(err, AppError::HttpError(e) if e.is_timeout())
}

/// 校验 Bithumb 响应的 `status` 字段并取出 `data`
pub fn extract_data(mut body: Value) -> Result<Value> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    if status != STATUS_OK {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(AppError::ApiError(format!("Bithumb API错误 ({}): {}", status, message)));
    }
    Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

/// 把字符串或数字形式的JSON值转换为 f64，非有限值视为无效
fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 按候选键依次取第一个存在的字段
fn field<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

/// 解析数组行 `[time, open, close, high, low, volume]`
fn candle_from_array(fields: &[Value]) -> Option<Candle> {
    if fields.len() < 6 {
        return None;
    }
    Some(Candle {
        timestamp: value_as_i64(&fields[0])?,
        open: value_as_f64(&fields[1])?,
        close: value_as_f64(&fields[2])?,
        high: value_as_f64(&fields[3])?,
        low: value_as_f64(&fields[4])?,
        volume: value_as_f64(&fields[5])?,
    })
}

fn candle_from_object(obj: &serde_json::Map<String, Value>) -> Option<Candle> {
    let num = |keys: &[&str]| field(obj, keys).and_then(value_as_f64);
    Some(Candle {
        timestamp: field(obj, &["time", "dt"]).and_then(value_as_i64)?,
        open: num(&["open", "openPrice"])?,
        close: num(&["close", "closePrice"])?,
        high: num(&["high", "highPrice"])?,
        low: num(&["low", "lowPrice"])?,
        volume: num(&["volume", "transactions"])?,
    })
}

/// 宽松解析K线数据
///
/// 支持两种行格式：
/// - 数组 `[time, open, close, high, low, volume]`，元素可为数字或数字字符串
/// - 对象，字段名允许 `time|dt`、`open|openPrice`、`close|closePrice`、`high|highPrice`、
///   `low|lowPrice`、`volume|transactions`
///
/// 字段缺失、时间戳或数值无法解析的行整行丢弃，不用0填充。结果按时间戳稳定排序。
pub fn parse_candles(symbol: &str, raw: &[Value]) -> CandleSeries {
    let candles: Vec<Candle> = raw
        .iter()
        .filter_map(|row| match row {
            Value::Array(fields) => candle_from_array(fields),
            Value::Object(obj) => candle_from_object(obj),
            _ => None,
        })
        .collect();

    let dropped = raw.len() - candles.len();
    if dropped > 0 {
        debug!(target: "api", symbol = %symbol, dropped, "丢弃 {} 行无效K线", dropped);
    }

    CandleSeries::new(symbol, candles)
}

#[async_trait]
impl ExchangeClient for BithumbApi {
    #[instrument(skip(self))]
    async fn list_symbols(&self, quote_currency: &str) -> Result<Vec<String>> {
        let url = format!("{}/ticker/ALL_{}", self.api_url, quote_currency);
        let data = self.get_data(&url, &[]).await?;

        let obj = data
            .as_object()
            .ok_or_else(|| AppError::DataError("品种列表的data字段不是对象".to_string()))?;

        // 除 date 字段之外的所有键都是品种代码
        let mut markets: Vec<String> = obj.keys().filter(|k| *k != "date").cloned().collect();
        markets.sort();

        debug!(target: "api", count = markets.len(), "{} 市场品种列表获取成功", quote_currency);
        Ok(markets)
    }

    #[instrument(skip(self), fields(interval = %interval))]
    async fn fetch_candles(
        &self,
        symbol: &str,
        quote_currency: &str,
        interval: CandleInterval,
        count: usize,
    ) -> Result<CandleSeries> {
        let url = format!(
            "{}/candlestick/{}_{}/{}",
            self.api_url, symbol, quote_currency, interval
        );
        let data = self.get_data(&url, &[("count", count.to_string())]).await?;

        let rows = data
            .as_array()
            .ok_or_else(|| AppError::DataError(format!("{} K线数据不是数组", symbol)))?;
        let series = parse_candles(symbol, rows);

        debug!(target: "api", symbol = %symbol, count = series.len(), "K线数据获取成功");
        Ok(series)
    }
}
