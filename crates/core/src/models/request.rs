use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MonitorError;

/// 采集任务的默认优先级，数值越小越优先
pub const DEFAULT_PRIORITY: i32 = 1;
/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 默认退避基准延迟（毫秒）
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 2000;

/// 采集任务类型，只用于区分触发来源，处理逻辑相同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "collect-resource-usage")]
    Scheduled,
    #[serde(rename = "manual-collect-resource-usage")]
    Manual,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scheduled => "collect-resource-usage",
            JobKind::Manual => "manual-collect-resource-usage",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collect-resource-usage" => Ok(JobKind::Scheduled),
            "manual-collect-resource-usage" => Ok(JobKind::Manual),
            other => Err(MonitorError::InvalidPayload(format!("未知的任务类型: {other}"))),
        }
    }
}

/// 入队负载
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPayload {
    pub timestamp: Option<DateTime<Utc>>,
}

impl CollectionPayload {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
        }
    }
}

/// 入队选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    pub priority: i32,
    /// 延迟可被领取的毫秒数
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
}

/// 重试退避策略: delay(n) = base * 2^(n-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    #[serde(rename = "delay")]
    pub base_delay_ms: u64,
}

impl BackoffPolicy {
    pub fn exponential(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms,
        }
    }

    /// 第 `attempt` 次失败后的等待时间，`attempt` 从 1 开始
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_DELAY_MS)
    }
}

/// 队列级重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// 一次失败之后队列采取的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 重新进入延迟队列
    Retry { attempt: u32, delay: Duration },
    /// 尝试次数耗尽，进入失败（死信）状态
    DeadLetter { attempts: u32 },
}

impl RetryDecision {
    /// `attempts_made` 为本次失败计入后的尝试次数
    pub fn decide(attempts_made: u32, max_attempts: u32, backoff: &BackoffPolicy) -> Self {
        if attempts_made >= max_attempts {
            RetryDecision::DeadLetter {
                attempts: attempts_made,
            }
        } else {
            RetryDecision::Retry {
                attempt: attempts_made,
                delay: backoff.delay_for_attempt(attempts_made),
            }
        }
    }

    pub fn is_dead_letter(&self) -> bool {
        matches!(self, RetryDecision::DeadLetter { .. })
    }
}

/// 队列中的一个采集请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRequest {
    pub id: String,
    pub job_kind: JobKind,
    pub timestamp: Option<DateTime<Utc>>,
    pub priority: i32,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl CollectionRequest {
    /// 创建新请求，负载未带时间戳时使用入队时间
    pub fn new(
        id: impl Into<String>,
        job_kind: JobKind,
        payload: CollectionPayload,
        options: &EnqueueOptions,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            job_kind,
            timestamp: payload.timestamp.or(Some(now)),
            priority: options.priority,
            attempts_made: 0,
            max_attempts: policy.max_attempts,
            backoff: policy.backoff,
            enqueued_at: now,
            failed_reason: None,
        }
    }

    /// 如果当前这次尝试失败，队列将要采取的动作
    pub fn decide_after_failure(&self) -> RetryDecision {
        RetryDecision::decide(self.attempts_made + 1, self.max_attempts, &self.backoff)
    }

    pub fn to_json(&self) -> crate::MonitorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> crate::MonitorResult<Self> {
        serde_json::from_str(data).map_err(|e| MonitorError::InvalidPayload(e.to_string()))
    }
}

/// 请求在队列中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Waiting => "waiting",
            RequestState::Delayed => "delayed",
            RequestState::Active => "active",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Failed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestState {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RequestState::Waiting),
            "delayed" => Ok(RequestState::Delayed),
            "active" => Ok(RequestState::Active),
            "completed" => Ok(RequestState::Completed),
            "failed" => Ok(RequestState::Failed),
            other => Err(MonitorError::Queue(format!("未知的请求状态: {other}"))),
        }
    }
}

/// 请求及其当前状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub request: CollectionRequest,
    pub state: RequestState,
}

/// 各状态的请求数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// 领取凭证，ack/nack 时必须提供
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    pub request_id: String,
    pub lock_token: String,
}

/// 被某个 Worker 领取的请求
#[derive(Debug, Clone)]
pub struct ClaimedRequest {
    pub request: CollectionRequest,
    pub handle: AckHandle,
}

/// 队列客户端连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Ready,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
