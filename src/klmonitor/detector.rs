//! 成交量放量检测
//!
//! 纯函数：不做IO、不持有状态，相同输入得到相同结果。

use crate::klcommon::{CandleSeries, SpikeAnalysis, SpikeContext};

/// 计算最近 `window` 根K线成交量的算术平均（SMA）
///
/// 数据不足 `window` 根或 `window` 为0时返回 `None`。
pub fn compute_baseline(series: &CandleSeries, window: usize) -> Option<f64> {
    if window == 0 || series.len() < window {
        return None;
    }
    let sum: f64 = series.recent_volumes(window).sum();
    Some(sum / window as f64)
}

/// 判断当前成交量是否相对SMA基准放量
///
/// - 空序列返回中性结果，`candles_needed = window`
/// - `current_volume_override` 为空时使用最新一根K线的成交量
/// - 基准不可用或为0时不判定放量，`candles_needed = window - len`（可能为负）
/// - `multiplier >= threshold` 即视为放量（含边界）
pub fn evaluate(
    series: &CandleSeries,
    window: usize,
    multiplier_threshold: f64,
    current_volume_override: Option<f64>,
) -> SpikeAnalysis {
    let Some(latest) = series.last() else {
        return SpikeAnalysis::neutral(window);
    };

    let current_volume = current_volume_override.unwrap_or(latest.volume);

    let baseline = match compute_baseline(series, window) {
        Some(b) if b != 0.0 => b,
        _ => {
            return SpikeAnalysis {
                current_volume,
                candles_needed: window as i64 - series.len() as i64,
                ..SpikeAnalysis::neutral(window)
            };
        }
    };

    let multiplier = current_volume / baseline;
    let is_spike = multiplier >= multiplier_threshold;

    SpikeAnalysis {
        is_spike,
        current_volume,
        baseline_volume: baseline,
        multiplier,
        candles_needed: 0,
        context: is_spike.then(|| SpikeContext {
            symbol: series.symbol().to_string(),
            current_price: latest.close,
            timestamp: latest.timestamp,
        }),
    }
}

/// 带固定参数的放量检测器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeDetector {
    /// SMA周期
    pub window: usize,
    /// 放量倍数阈值
    pub multiplier_threshold: f64,
}

impl SpikeDetector {
    pub fn new(window: usize, multiplier_threshold: f64) -> Self {
        Self { window, multiplier_threshold }
    }

    /// 以最新一根K线的成交量作为当前成交量进行检测
    pub fn evaluate(&self, series: &CandleSeries) -> SpikeAnalysis {
        evaluate(series, self.window, self.multiplier_threshold, None)
    }
}
