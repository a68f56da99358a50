// 导出模块
pub mod klcommon;
pub mod klmonitor;

// Re-export error types
pub use klcommon::error::AppError;
