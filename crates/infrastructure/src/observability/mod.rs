//! Observability module
//!
//! 结构化事件日志与 Prometheus 指标。

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::{init_prometheus, MetricsCollector};
pub use structured_logger::StructuredLogger;
