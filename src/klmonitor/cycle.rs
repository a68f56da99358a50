//! 单次监控周期
//!
//! 按交易所返回的顺序逐个检查品种，品种之间固定间隔，单个品种的失败只跳过该品种。

use crate::klcommon::{AppError, ExchangeClient, MonitorConfig, Notifier, SpikeAnalysis};
use crate::klmonitor::{AlertDedupStore, Clock, SpikeDetector};
use chrono::Local;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn, Instrument};

/// 跳过品种的原因
#[derive(Debug)]
pub enum SkipReason {
    /// 拉取K线失败
    FetchFailed(AppError),
    /// K线数量少于SMA周期，`missing` 为还差的根数
    InsufficientData { received: usize, missing: usize },
    /// 检查过程中panic
    Panicked,
}

/// 单个品种的检查结果
#[derive(Debug)]
pub enum SymbolOutcome {
    Skipped(SkipReason),
    Quiet,
    Spike(SpikeAnalysis),
}

/// 监控周期统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub symbols_checked: usize,
    pub spikes_detected: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub delivery_failures: usize,
    pub skipped: usize,
}

/// 执行一次完整的监控周期
///
/// 品种列表获取失败或为空时直接返回空统计；周期结束后不会自动循环。
pub async fn run_cycle<E, N>(
    config: &MonitorConfig,
    exchange: &E,
    notifier: &N,
    store: &mut AlertDedupStore,
    clock: &dyn Clock,
) -> CycleReport
where
    E: ExchangeClient + ?Sized,
    N: Notifier + ?Sized,
{
    let span = tracing::info_span!("monitoring_cycle", quote = %config.quote_currency);
    run_symbols(config, exchange, notifier, store, clock).instrument(span).await
}

async fn run_symbols<E, N>(
    config: &MonitorConfig,
    exchange: &E,
    notifier: &N,
    store: &mut AlertDedupStore,
    clock: &dyn Clock,
) -> CycleReport
where
    E: ExchangeClient + ?Sized,
    N: Notifier + ?Sized,
{
    let mut report = CycleReport::default();

    info!(target: "cycle", "{}", "=".repeat(60));
    info!(target: "cycle", "监控开始 - {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    info!(target: "cycle", "{} 市场品种列表获取中...", config.quote_currency);
    let symbols = match exchange.list_symbols(&config.quote_currency).await {
        Ok(symbols) => symbols,
        Err(e) => {
            warn!(
                target: "cycle",
                quote = %config.quote_currency,
                error.summary = e.get_error_type_summary(),
                error.details = %e,
                "品种列表获取失败，本周期跳过"
            );
            return report;
        }
    };
    info!(target: "cycle", "共发现 {} 个品种", symbols.len());

    if symbols.is_empty() {
        warn!(target: "cycle", "品种列表为空，本周期跳过");
        return report;
    }

    let detector = SpikeDetector::new(config.sma_period, config.volume_multiplier);
    let total = symbols.len();

    for (i, symbol) in symbols.iter().enumerate() {
        debug!(target: "cycle", "[{}/{}] {} 检查中...", i + 1, total, symbol);

        let span = tracing::info_span!("check_symbol", symbol = %symbol);
        let outcome = AssertUnwindSafe(check_symbol(config, exchange, &detector, symbol))
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|_| {
                error!(target: "cycle", symbol = %symbol, "{} 检查过程中发生panic，跳过", symbol);
                SymbolOutcome::Skipped(SkipReason::Panicked)
            });

        report.symbols_checked += 1;
        match outcome {
            SymbolOutcome::Skipped(reason) => {
                report.skipped += 1;
                match reason {
                    SkipReason::InsufficientData { received, missing } => {
                        debug!(
                            target: "cycle",
                            symbol = %symbol,
                            candles_missing = missing,
                            "{}: K线数据不足 (已有 {} 根，还差 {} 根)", symbol, received, missing
                        );
                    }
                    SkipReason::FetchFailed(e) => {
                        debug!(
                            target: "cycle",
                            symbol = %symbol,
                            error.summary = e.get_error_type_summary(),
                            "{}: K线获取失败，跳过: {}", symbol, e
                        );
                    }
                    SkipReason::Panicked => {}
                }
            }
            SymbolOutcome::Quiet => {}
            SymbolOutcome::Spike(analysis) => {
                report.spikes_detected += 1;
                warn!(
                    target: "cycle",
                    symbol = %symbol,
                    multiplier = analysis.multiplier,
                    "⚠️ {} 成交量放量! 当前: {:.2}, 平均: {:.2}, 倍数: {:.2}",
                    symbol, analysis.current_volume, analysis.baseline_volume, analysis.multiplier
                );
                dispatch_alert(config, notifier, store, clock, symbol, &analysis, &mut report).await;
            }
        }

        // 请求节流：无论结果如何都等待
        tokio::time::sleep(config.api_delay()).await;
    }

    if report.spikes_detected > 0 {
        info!(
            target: "cycle",
            alerts_sent = report.alerts_sent,
            alerts_suppressed = report.alerts_suppressed,
            delivery_failures = report.delivery_failures,
            "监控完成 - 共检查 {} 个品种，发现 {} 个放量",
            report.symbols_checked, report.spikes_detected
        );
    } else {
        debug!(target: "cycle", skipped = report.skipped, "监控完成 - {} 个品种无异常", report.symbols_checked);
    }

    report
}

/// 拉取K线并运行放量检测
pub(super) async fn check_symbol<E>(
    config: &MonitorConfig,
    exchange: &E,
    detector: &SpikeDetector,
    symbol: &str,
) -> SymbolOutcome
where
    E: ExchangeClient + ?Sized,
{
    let series = match exchange
        .fetch_candles(
            symbol,
            &config.quote_currency,
            config.candle_interval,
            config.candle_fetch_count(),
        )
        .await
    {
        Ok(series) => series,
        Err(e) => return SymbolOutcome::Skipped(SkipReason::FetchFailed(e)),
    };

    let analysis = detector.evaluate(&series);
    let missing = analysis.candles_missing();
    if missing > 0 {
        return SymbolOutcome::Skipped(SkipReason::InsufficientData {
            received: series.len(),
            missing,
        });
    }

    if analysis.is_spike {
        SymbolOutcome::Spike(analysis)
    } else {
        SymbolOutcome::Quiet
    }
}

/// 检查去重状态后推送告警，送达成功才记录为已告警
async fn dispatch_alert<N>(
    config: &MonitorConfig,
    notifier: &N,
    store: &mut AlertDedupStore,
    clock: &dyn Clock,
    symbol: &str,
    analysis: &SpikeAnalysis,
    report: &mut CycleReport,
) where
    N: Notifier + ?Sized,
{
    store.evaluate_reset(clock.now());

    if store.should_suppress(symbol) {
        debug!(target: "cycle", "{}: 已推送过告警，跳过", symbol);
        report.alerts_suppressed += 1;
        return;
    }

    if notifier.send_spike_alert(analysis, config.candle_interval).await {
        info!(
            target: "cycle",
            symbol = %symbol,
            "🚨 {} 放量告警推送成功 (倍数: {:.2})", symbol, analysis.multiplier
        );
        store.mark_alerted(symbol);
        report.alerts_sent += 1;
    } else {
        error!(target: "cycle", symbol = %symbol, "{} 告警推送失败，下次放量时重试", symbol);
        report.delivery_failures += 1;
    }
}
