//! 成交量放量监控核心
//!
//! 数据单向流动：交易所 -> K线序列 -> 放量检测 -> 告警去重 -> 推送。
//! 控制流自上而下：MonitorRunner -> run_cycle -> detector，下层不回调上层。

pub mod clock;
pub mod cycle;
pub mod dedup;
pub mod detector;
pub mod runner;


pub use clock::{Clock, SystemClock};
pub use cycle::{run_cycle, CycleReport, SymbolOutcome};
pub use dedup::AlertDedupStore;
pub use detector::SpikeDetector;
pub use runner::{MonitorRunner, RunnerState, FALLBACK_RETRY_DELAY};
