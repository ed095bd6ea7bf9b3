//! Metrics collector
//!
//! 基于 `metrics` crate 的计数器与直方图，导出器由 `init_prometheus` 安装。

use std::net::SocketAddr;

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use resource_status_core::{QueueCounts, RetryDecision};
use tracing::info;

/// 安装全局 Prometheus 记录器并在 `addr` 上监听抓取请求
///
/// 必须在 tokio 运行时中调用。
pub fn init_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

/// Metrics collector for the sampling pipeline
pub struct MetricsCollector {
    requests_enqueued_total: Counter,
    requests_completed_total: Counter,
    requests_failed_total: Counter,
    requests_retried_total: Counter,
    requests_dead_lettered_total: Counter,
    collection_duration: Histogram,
    sample_cpu_usage: Gauge,
    sample_memory_percent: Gauge,
    sample_disk_percent: Gauge,
    queue_waiting: Gauge,
    queue_delayed: Gauge,
    queue_failed: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests_enqueued_total: counter!("resource_status_requests_enqueued_total"),
            requests_completed_total: counter!("resource_status_requests_completed_total"),
            requests_failed_total: counter!("resource_status_requests_failed_total"),
            requests_retried_total: counter!("resource_status_requests_retried_total"),
            requests_dead_lettered_total: counter!("resource_status_requests_dead_lettered_total"),
            collection_duration: histogram!("resource_status_collection_duration_seconds"),
            sample_cpu_usage: gauge!("resource_status_sample_cpu_usage"),
            sample_memory_percent: gauge!("resource_status_sample_memory_percent"),
            sample_disk_percent: gauge!("resource_status_sample_disk_percent"),
            queue_waiting: gauge!("resource_status_queue_waiting"),
            queue_delayed: gauge!("resource_status_queue_delayed"),
            queue_failed: gauge!("resource_status_queue_failed"),
        }
    }

    pub fn record_enqueued(&self) {
        self.requests_enqueued_total.increment(1);
    }

    /// Record a completed collection and the sample it produced
    pub fn record_completed(
        &self,
        duration_seconds: f64,
        cpu_usage: f64,
        memory_percent: f64,
        disk_percent: f64,
    ) {
        self.requests_completed_total.increment(1);
        self.collection_duration.record(duration_seconds);
        self.sample_cpu_usage.set(cpu_usage);
        self.sample_memory_percent.set(memory_percent);
        self.sample_disk_percent.set(disk_percent);
    }

    pub fn record_failure(&self, decision: Option<&RetryDecision>) {
        self.requests_failed_total.increment(1);
        match decision {
            Some(RetryDecision::Retry { .. }) => self.requests_retried_total.increment(1),
            Some(RetryDecision::DeadLetter { .. }) => {
                self.requests_dead_lettered_total.increment(1)
            }
            None => {}
        }
    }

    pub fn update_queue_counts(&self, counts: &QueueCounts) {
        self.queue_waiting.set(counts.waiting as f64);
        self.queue_delayed.set(counts.delayed as f64);
        self.queue_failed.set(counts.failed as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
