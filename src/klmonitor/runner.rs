//! 持续监控运行器
//!
//! 状态机：Starting -> Running(循环) -> Stopped。
//! 周期内的panic在这里被拦截，记录后按固定间隔重试，进程不会因此退出。

use crate::klcommon::{ExchangeClient, MonitorConfig, Notifier};
use crate::klmonitor::{run_cycle, AlertDedupStore, Clock, CycleReport, SystemClock};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 周期异常后的固定重试等待时间
pub const FALLBACK_RETRY_DELAY: Duration = Duration::from_secs(300);

/// 运行器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Starting,
    Running,
    Stopped,
}

/// 持续监控运行器，独占配置、去重状态和两个外部客户端
pub struct MonitorRunner<E, N> {
    config: MonitorConfig,
    exchange: E,
    notifier: N,
    store: AlertDedupStore,
    clock: Box<dyn Clock>,
    state: RunnerState,
}

impl<E, N> MonitorRunner<E, N>
where
    E: ExchangeClient,
    N: Notifier,
{
    pub fn new(config: MonitorConfig, exchange: E, notifier: N) -> Self {
        Self::with_clock(config, exchange, notifier, Box::new(SystemClock))
    }

    pub fn with_clock(config: MonitorConfig, exchange: E, notifier: N, clock: Box<dyn Clock>) -> Self {
        let store = AlertDedupStore::new(config.alert_reset_period());
        Self {
            config,
            exchange,
            notifier,
            store,
            clock,
            state: RunnerState::Starting,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn store(&self) -> &AlertDedupStore {
        &self.store
    }

    /// 只执行一次监控周期
    pub async fn run_once(&mut self) -> CycleReport {
        run_cycle(
            &self.config,
            &self.exchange,
            &self.notifier,
            &mut self.store,
            self.clock.as_ref(),
        )
        .await
    }

    /// 按固定间隔持续监控，直到 `shutdown` 被取消
    ///
    /// 取消只在等待期间生效，已开始的周期会执行完毕。
    pub async fn run_continuous(&mut self, shutdown: CancellationToken) {
        self.state = RunnerState::Starting;
        info!(target: "runner", "Bithumb成交量监控启动");
        info!(
            target: "runner",
            "检查间隔: {}秒 ({:.1}分钟)",
            self.config.check_interval_secs,
            self.config.check_interval_secs as f64 / 60.0
        );
        info!(target: "runner", "K线周期: {}", self.config.candle_interval);

        // 启动消息推送失败不影响进入运行状态
        self.notifier.send_startup_message().await;

        self.state = RunnerState::Running;
        while !shutdown.is_cancelled() {
            let cycle = AssertUnwindSafe(run_cycle(
                &self.config,
                &self.exchange,
                &self.notifier,
                &mut self.store,
                self.clock.as_ref(),
            ))
            .catch_unwind()
            .await;

            let wait = match cycle {
                Ok(_) => {
                    info!(target: "runner", "{}秒后进行下一次检查...", self.config.check_interval_secs);
                    self.config.check_interval()
                }
                Err(panic) => {
                    error!(
                        target: "runner",
                        retry_in_secs = FALLBACK_RETRY_DELAY.as_secs(),
                        error.summary = "monitoring_cycle_panicked",
                        "监控过程中发生错误: {}", panic_message(panic.as_ref())
                    );
                    info!(target: "runner", "{}秒后重试...", FALLBACK_RETRY_DELAY.as_secs());
                    FALLBACK_RETRY_DELAY
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(target: "runner", "收到中止信号");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.state = RunnerState::Stopped;
        info!(target: "runner", "监控结束");
    }
}

/// 提取panic携带的消息
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
