//! 告警去重
//!
//! 品种首次告警送达后进入抑制状态，直到全局清空周期到达后所有品种一起恢复。
//! 只有一个共享的清空时钟，没有按品种的过期时间。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

/// 已告警品种集合及其清空策略
#[derive(Debug, Clone, Default)]
pub struct AlertDedupStore {
    alerted: HashSet<String>,
    last_reset_time: Option<DateTime<Utc>>,
    reset_period: Option<Duration>,
}

impl AlertDedupStore {
    /// `reset_period` 为空时永不清空
    pub fn new(reset_period: Option<Duration>) -> Self {
        Self {
            alerted: HashSet::new(),
            last_reset_time: None,
            reset_period,
        }
    }

    /// 检查是否到达清空周期
    ///
    /// - 未配置清空周期：什么都不做
    /// - 首次调用：只记录基准时间，不清空
    /// - 距上次清空已满一个周期：清空集合并更新基准时间
    ///
    /// 返回本次被清空的品种数量，未清空时返回 `None`。
    pub fn evaluate_reset(&mut self, now: DateTime<Utc>) -> Option<usize> {
        let period = self.reset_period?;

        let Some(last) = self.last_reset_time else {
            self.last_reset_time = Some(now);
            debug!(target: "dedup", "记录告警清空基准时间");
            return None;
        };

        if now - last < period {
            return None;
        }

        let reset_count = self.alerted.len();
        self.alerted.clear();
        self.last_reset_time = Some(now);
        info!(target: "dedup", reset_count, "已告警品种列表清空 (清空数量: {})", reset_count);
        Some(reset_count)
    }

    /// 品种是否已告警过
    pub fn should_suppress(&self, symbol: &str) -> bool {
        self.alerted.contains(symbol)
    }

    /// 记录已送达告警的品种（幂等）
    pub fn mark_alerted(&mut self, symbol: &str) {
        if !self.alerted.contains(symbol) {
            self.alerted.insert(symbol.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.alerted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerted.is_empty()
    }

    pub fn last_reset_time(&self) -> Option<DateTime<Utc>> {
        self.last_reset_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_mark_alerted_is_idempotent() {
        let mut store = AlertDedupStore::new(None);
        store.mark_alerted("BTC");
        assert!(store.should_suppress("BTC"));
        store.mark_alerted("BTC");
        assert!(store.should_suppress("BTC"));
        assert_eq!(store.len(), 1);
        assert!(!store.should_suppress("ETH"));
    }

    #[test]
    fn test_no_reset_period_never_clears() {
        let mut store = AlertDedupStore::new(None);
        store.mark_alerted("BTC");
        assert_eq!(store.evaluate_reset(t0()), None);
        assert_eq!(store.evaluate_reset(t0() + Duration::days(365)), None);
        assert!(store.should_suppress("BTC"));
        assert_eq!(store.last_reset_time(), None);
    }

    #[test]
    fn test_first_evaluation_only_records_baseline() {
        let mut store = AlertDedupStore::new(Some(Duration::hours(1)));
        store.mark_alerted("BTC");
        assert_eq!(store.evaluate_reset(t0()), None);
        assert_eq!(store.last_reset_time(), Some(t0()));
        assert!(store.should_suppress("BTC"));
    }

    #[test]
    fn test_reset_after_full_period() {
        let mut store = AlertDedupStore::new(Some(Duration::hours(1)));
        store.evaluate_reset(t0());
        store.mark_alerted("BTC");
        store.mark_alerted("ETH");

        // 未满一个周期
        assert_eq!(store.evaluate_reset(t0() + Duration::minutes(59)), None);
        assert!(store.should_suppress("BTC"));

        // 正好满一个周期
        let now = t0() + Duration::hours(1);
        assert_eq!(store.evaluate_reset(now), Some(2));
        assert!(store.is_empty());
        assert!(!store.should_suppress("BTC"));
        assert_eq!(store.last_reset_time(), Some(now));

        // 清空后重新计时
        store.mark_alerted("XRP");
        assert_eq!(store.evaluate_reset(now + Duration::minutes(30)), None);
        assert!(store.should_suppress("XRP"));
    }
}
