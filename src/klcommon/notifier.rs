//! Discord webhook 告警推送

use crate::klcommon::{AppError, CandleInterval, Result, SpikeAnalysis};
use async_trait::async_trait;
use chrono::{Local, TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// 告警嵌入消息颜色（红色）
const ALERT_COLOR: u32 = 15158332;

const STARTUP_MESSAGE: &str = "✅ 빗썸 거래량 모니터링 시스템이 시작되었습니다!";

/// 告警推送通道
///
/// 推送失败只返回 `false`，不向调用方抛错。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 推送放量告警，成功送达返回 `true`
    async fn send_spike_alert(&self, analysis: &SpikeAnalysis, interval: CandleInterval) -> bool;

    /// 推送启动消息
    async fn send_startup_message(&self) -> bool;
}

/// Discord webhook 客户端
#[derive(Clone, Debug)]
pub struct DiscordWebhook {
    webhook_url: String,
    quote_currency: String,
    client: Client,
}

impl DiscordWebhook {
    pub fn new(
        webhook_url: impl Into<String>,
        quote_currency: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::NotifyError(format!("创建webhook客户端失败: {}", e)))?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            quote_currency: quote_currency.into(),
            client,
        })
    }

    /// 构建放量告警的 webhook 报文，非放量结果返回 `None`
    pub fn build_alert_payload(&self, analysis: &SpikeAnalysis, interval: CandleInterval) -> Option<Value> {
        let context = analysis.context.as_ref()?;

        let time_str = Local
            .timestamp_millis_opt(context.timestamp)
            .single()
            .filter(|_| context.timestamp > 0)
            .unwrap_or_else(Local::now)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        let embed = json!({
            "title": "🚨 거래량 급증 알림",
            "description": format!("**{}/{}** ({})", context.symbol, self.quote_currency, interval),
            "color": ALERT_COLOR,
            "fields": [
                {
                    "name": "현재 거래량",
                    "value": format_with_separators(analysis.current_volume, 2),
                    "inline": true
                },
                {
                    "name": "평균 거래량 (SMA)",
                    "value": format_with_separators(analysis.baseline_volume, 2),
                    "inline": true
                },
                {
                    "name": "배수",
                    "value": format!("**{:.2}배**", analysis.multiplier),
                    "inline": true
                },
                {
                    "name": "현재 가격",
                    "value": format_price(context.current_price, &self.quote_currency),
                    "inline": true
                },
                {
                    "name": "시간",
                    "value": time_str,
                    "inline": true
                }
            ],
            "footer": { "text": "빗썸 거래량 모니터링" },
            "timestamp": Utc::now().to_rfc3339()
        });

        Some(json!({ "embeds": [embed] }))
    }

    async fn post(&self, payload: &Value) -> Result<()> {
        let response = self.client.post(&self.webhook_url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(200).collect();
            return Err(AppError::NotifyError(format!("webhook响应状态错误: {} - {}", status, preview)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn send_spike_alert(&self, analysis: &SpikeAnalysis, interval: CandleInterval) -> bool {
        let Some(payload) = self.build_alert_payload(analysis, interval) else {
            error!(target: "notifier", "分析结果不是放量，拒绝推送");
            return false;
        };
        let symbol = analysis.symbol().unwrap_or("Unknown");

        match self.post(&payload).await {
            Ok(()) => {
                debug!(target: "notifier", symbol = %symbol, "Discord告警推送成功");
                true
            }
            Err(e) => {
                error!(
                    target: "notifier",
                    symbol = %symbol,
                    error.summary = e.get_error_type_summary(),
                    error.details = %e,
                    "Discord告警推送失败"
                );
                false
            }
        }
    }

    async fn send_startup_message(&self) -> bool {
        match self.post(&json!({ "content": STARTUP_MESSAGE })).await {
            Ok(()) => {
                info!(target: "notifier", "Discord启动消息推送成功");
                true
            }
            Err(e) => {
                error!(
                    target: "notifier",
                    message_kind = "startup",
                    error.summary = e.get_error_type_summary(),
                    error.details = %e,
                    "Discord启动消息推送失败"
                );
                false
            }
        }
    }
}

/// 按千分位分组格式化数字
pub fn format_with_separators(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// 按价格区间选择小数位数
pub fn format_price(price: f64, quote_currency: &str) -> String {
    if price == 0.0 {
        return format!("0 {}", quote_currency);
    }

    let body = if price < 0.01 {
        format!("{:.6}", price)
    } else if price < 1.0 {
        format!("{:.4}", price)
    } else if price < 100.0 {
        format!("{:.2}", price)
    } else if price < 1000.0 {
        format_with_separators(price, 1)
    } else {
        format_with_separators(price, 0)
    };
    format!("{} {}", body, quote_currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klcommon::SpikeContext;

    fn spike() -> SpikeAnalysis {
        SpikeAnalysis {
            is_spike: true,
            current_volume: 12345.678,
            baseline_volume: 1500.0,
            multiplier: 8.230452,
            candles_needed: 0,
            context: Some(SpikeContext {
                symbol: "BTC".to_string(),
                current_price: 95_123_456.0,
                timestamp: 1_700_000_000_000,
            }),
        }
    }

    fn webhook() -> DiscordWebhook {
        DiscordWebhook::new("https://discord.com/api/webhooks/1/abc", "KRW", Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_format_price_tiers() {
        assert_eq!(format_price(0.0, "KRW"), "0 KRW");
        assert_eq!(format_price(0.001234, "KRW"), "0.001234 KRW");
        assert_eq!(format_price(0.5, "KRW"), "0.5000 KRW");
        assert_eq!(format_price(12.346, "KRW"), "12.35 KRW");
        assert_eq!(format_price(512.34, "KRW"), "512.3 KRW");
        assert_eq!(format_price(95_123_456.0, "KRW"), "95,123,456 KRW");
    }

    #[test]
    fn test_format_with_separators() {
        assert_eq!(format_with_separators(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_with_separators(999.0, 2), "999.00");
        assert_eq!(format_with_separators(1000.0, 0), "1,000");
        assert_eq!(format_with_separators(-1234.5, 1), "-1,234.5");
    }

    #[test]
    fn test_alert_payload_fields() {
        let payload = webhook().build_alert_payload(&spike(), CandleInterval::M5).unwrap();
        let embed = &payload["embeds"][0];
        assert_eq!(embed["description"], "**BTC/KRW** (5m)");
        assert_eq!(embed["color"], ALERT_COLOR);
        assert_eq!(embed["fields"][0]["value"], "12,345.68");
        assert_eq!(embed["fields"][1]["value"], "1,500.00");
        assert_eq!(embed["fields"][2]["value"], "**8.23배**");
        assert_eq!(embed["fields"][3]["value"], "95,123,456 KRW");
    }

    #[test]
    fn test_non_spike_has_no_payload() {
        let analysis = SpikeAnalysis::neutral(20);
        assert!(webhook().build_alert_payload(&analysis, CandleInterval::M5).is_none());
    }
}
