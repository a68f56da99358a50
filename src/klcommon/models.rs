use serde::{Deserialize, Serialize};

/// 单根K线（OHLCV）
///
/// 上游数据按原样信任，不校验 `low <= open, close <= high`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// K线开盘时间（毫秒时间戳）
    pub timestamp: i64,
    /// 开盘价
    pub open: f64,
    /// 最高价
    pub high: f64,
    /// 最低价
    pub low: f64,
    /// 收盘价
    pub close: f64,
    /// 成交量
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }
}

/// 单个品种的K线序列，按时间升序排列
///
/// 每个监控周期重新拉取，分析完即丢弃，不跨周期缓存。
/// 允许重复时间戳，不做去重。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    symbol: String,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// 创建序列并按时间戳稳定排序（同一时间戳保持拉取顺序）
    pub fn new(symbol: impl Into<String>, mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        Self { symbol: symbol.into(), candles }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// 最新一根K线
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// 最近 `n` 根K线的成交量（不足 `n` 根时返回全部）
    pub fn recent_volumes(&self, n: usize) -> impl Iterator<Item = f64> + '_ {
        let start = self.candles.len().saturating_sub(n);
        self.candles[start..].iter().map(|c| c.volume)
    }
}

/// 放量告警所需的附加信息，仅在 `is_spike` 为真时存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeContext {
    pub symbol: String,
    /// 最新K线收盘价
    pub current_price: f64,
    /// 最新K线时间（毫秒时间戳）
    pub timestamp: i64,
}

/// 一次放量检测的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeAnalysis {
    pub is_spike: bool,
    pub current_volume: f64,
    /// 成交量SMA基准
    pub baseline_volume: f64,
    /// current / baseline，基准不可用或为0时为0
    pub multiplier: f64,
    /// 还差多少根K线才能计算基准（可能为负，展示时截断到0）
    pub candles_needed: i64,
    pub context: Option<SpikeContext>,
}

impl SpikeAnalysis {
    /// 中性结果：无放量，全部成交量为0
    pub fn neutral(window: usize) -> Self {
        Self {
            is_spike: false,
            current_volume: 0.0,
            baseline_volume: 0.0,
            multiplier: 0.0,
            candles_needed: window as i64,
            context: None,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.symbol.as_str())
    }

    /// 用于展示的缺口数量
    pub fn candles_missing(&self) -> usize {
        self.candles_needed.max(0) as usize
    }
}
