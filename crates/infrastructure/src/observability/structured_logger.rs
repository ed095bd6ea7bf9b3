//! Structured logging utilities
//!
//! 所有事件都带 `event` 字段，便于在 JSON 日志中过滤。

use chrono::{DateTime, Utc};
use resource_status_core::{
    CollectionRequest, ConnectionState, ErrorRecord, QueueCounts, ResourceSample, RetryDecision,
};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log queue connection state transition
    pub fn log_connection_state(
        host: &str,
        port: u16,
        previous: ConnectionState,
        next: ConnectionState,
    ) {
        match next {
            ConnectionState::Ready => info!(
                event = "queue_connection_ready",
                redis.host = host,
                redis.port = port,
                connection.previous = previous.as_str(),
                "Queue connection established"
            ),
            ConnectionState::Reconnecting => warn!(
                event = "queue_connection_lost",
                redis.host = host,
                redis.port = port,
                connection.previous = previous.as_str(),
                "Queue connection lost, reconnecting"
            ),
            ConnectionState::Connecting | ConnectionState::Closed => info!(
                event = "queue_connection_state",
                redis.host = host,
                redis.port = port,
                connection.previous = previous.as_str(),
                connection.state = next.as_str(),
                "Queue connection state changed"
            ),
        }
    }

    /// Log reconnect attempt
    pub fn log_reconnect_attempt(host: &str, port: u16, attempt: u32, delay_ms: u64, reason: &str) {
        warn!(
            event = "queue_reconnect_attempt",
            redis.host = host,
            redis.port = port,
            reconnect.attempt = attempt,
            reconnect.delay_ms = delay_ms,
            reconnect.reason = reason,
            "Queue reconnect scheduled"
        );
    }

    /// Log collection request enqueued
    pub fn log_request_enqueued(request: &CollectionRequest, delay_ms: u64) {
        info!(
            event = "request_enqueued",
            request.id = %request.id,
            request.kind = request.job_kind.as_str(),
            request.priority = request.priority,
            request.delay_ms = delay_ms,
            request.timestamp = ?request.timestamp,
            "Collection request enqueued"
        );
    }

    /// Log collection request claimed by worker
    pub fn log_request_claimed(request: &CollectionRequest) {
        debug!(
            event = "request_claimed",
            request.id = %request.id,
            request.kind = request.job_kind.as_str(),
            request.attempts_made = request.attempts_made,
            "Collection request claimed"
        );
    }

    /// Log the queue's decision after a failure
    pub fn log_retry_decision(request_id: &str, decision: &RetryDecision) {
        match decision {
            RetryDecision::Retry { attempt, delay } => warn!(
                event = "request_retry_scheduled",
                request.id = request_id,
                request.attempt = attempt,
                retry.delay_ms = delay.as_millis() as u64,
                "Collection request scheduled for retry"
            ),
            RetryDecision::DeadLetter { attempts } => error!(
                event = "request_dead_lettered",
                request.id = request_id,
                request.attempts = attempts,
                "Collection request exhausted its attempts"
            ),
        }
    }

    /// Log a failed processing attempt with its error record
    pub fn log_request_failed(request_id: &str, attempt: u32, record: &ErrorRecord) {
        error!(
            event = "request_failed",
            request.id = request_id,
            request.attempt = attempt,
            error.name = %record.name,
            error.message = %record.message,
            error.cause = record.cause.as_deref(),
            error.trace = %record.trace_string(),
            "Collection request failed"
        );
    }

    /// Log sample persisted
    pub fn log_sample_persisted(request_id: &str, sample: &ResourceSample, duration_ms: u64) {
        info!(
            event = "sample_persisted",
            request.id = request_id,
            sample.id = sample.id,
            sample.cpu_usage = sample.cpu_usage,
            sample.memory_used_mb = sample.memory_used_mb,
            sample.disk_used_mb = sample.disk_used_mb,
            sample.duration_ms = duration_ms,
            "Resource sample persisted"
        );
    }

    /// Log scheduler trigger
    pub fn log_trigger_fired(timezone: &str, fired_at: DateTime<Utc>, request_id: Option<&str>) {
        match request_id {
            Some(id) => info!(
                event = "trigger_fired",
                scheduler.timezone = timezone,
                scheduler.fired_at = %fired_at,
                request.id = id,
                "Scheduled collection enqueued"
            ),
            None => warn!(
                event = "trigger_skipped",
                scheduler.timezone = timezone,
                scheduler.fired_at = %fired_at,
                "Scheduled collection could not be enqueued"
            ),
        }
    }

    /// Log queue depth snapshot
    pub fn log_queue_counts(queue: &str, counts: &QueueCounts) {
        debug!(
            event = "queue_counts",
            queue.name = queue,
            queue.waiting = counts.waiting,
            queue.delayed = counts.delayed,
            queue.active = counts.active,
            queue.completed = counts.completed,
            queue.failed = counts.failed,
            "Queue counts sampled"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
