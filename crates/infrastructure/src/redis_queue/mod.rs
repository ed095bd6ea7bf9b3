//! 基于 Redis 的持久化工作队列
//!
//! 请求数据保存在 `job:{id}` 哈希中，状态由几个集合表示：
//!
//! ```text
//! delayed ──(到期)──> waiting ──(claim)──> active ──(ack)──> completed
//!    ^                   ^                   │
//!    └──────(nack, 未耗尽)────────────────────┤
//!                        └──(锁过期，重新投递)──┤
//!                                            └──(nack, 已耗尽)──> failed
//! ```

pub mod connection_manager;
pub mod keys;
pub mod scripts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::Script;
use resource_status_core::{
    config::QueueConfig, AckHandle, ClaimedRequest, CollectionPayload, CollectionRequest,
    ConnectionState, EnqueueOptions, ErrorRecord, JobKind, MonitorError, MonitorResult,
    QueueCounts, RequestState, RequestStatus, RetryDecision, RetryPolicy, WorkQueue,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

pub use connection_manager::RedisConnectionManager;
pub use keys::QueueKeys;

use crate::observability::StructuredLogger;

pub struct RedisWorkQueue {
    connection: Arc<RedisConnectionManager>,
    keys: QueueKeys,
    config: QueueConfig,
    policy: RetryPolicy,
    add_script: Script,
    claim_script: Script,
    ack_script: Script,
    nack_script: Script,
}

impl RedisWorkQueue {
    pub fn new(config: QueueConfig) -> MonitorResult<Self> {
        let connection = Arc::new(RedisConnectionManager::new(config.redis.clone())?);
        Ok(Self::with_connection(config, connection))
    }

    pub fn with_connection(config: QueueConfig, connection: Arc<RedisConnectionManager>) -> Self {
        Self {
            keys: QueueKeys::new(&config.key_prefix, &config.name),
            policy: config.retry_policy(),
            connection,
            config,
            add_script: Script::new(scripts::ADD),
            claim_script: Script::new(scripts::CLAIM),
            ack_script: Script::new(scripts::ACK),
            nack_script: Script::new(scripts::NACK),
        }
    }

    /// 创建队列并等待连接就绪（Redis 不可用时持续重试）
    pub async fn connect(config: QueueConfig) -> MonitorResult<Self> {
        let queue = Self::new(config)?;
        queue.connection.connect().await?;
        Ok(queue)
    }

    pub fn connection(&self) -> &Arc<RedisConnectionManager> {
        &self.connection
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    fn lock_duration_ms(&self) -> u64 {
        self.config.lock_duration_seconds.saturating_mul(1000)
    }

    /// 无法解析的请求直接移入 failed，不交给 Worker
    async fn discard_malformed(&self, id: &str, token: &str, err: &MonitorError) -> MonitorResult<()> {
        let record = ErrorRecord::from(err);
        error!(
            request.id = id,
            error.name = %record.name,
            error.message = %record.message,
            "Discarding malformed request payload"
        );
        let mut invocation = self.nack_script.prepare_invoke();
        invocation
            .key(self.keys.active())
            .key(self.keys.delayed())
            .key(self.keys.failed())
            .arg(self.keys.base())
            .arg(id)
            .arg(token)
            .arg(Utc::now().timestamp_millis())
            .arg(0u32)
            .arg(1u8)
            .arg(0u64)
            .arg(record.message.as_str())
            .arg(self.config.remove_on_fail);
        let _: i64 = self
            .connection
            .execute("NACK", |mut conn| {
                let invocation = &invocation;
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    #[instrument(skip(self, payload), fields(job.kind = %kind))]
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: CollectionPayload,
        options: EnqueueOptions,
    ) -> MonitorResult<String> {
        let id_key = self.keys.id_counter();
        let id: u64 = self
            .connection
            .execute("INCR", |mut conn| {
                let id_key = id_key.clone();
                async move { redis::cmd("INCR").arg(id_key).query_async(&mut conn).await }
            })
            .await?;
        let id = id.to_string();

        let now = Utc::now();
        let request = CollectionRequest::new(&id, kind, payload, &options, &self.policy, now);
        let available_at_ms = now.timestamp_millis() + options.delay_ms as i64;

        let mut invocation = self.add_script.prepare_invoke();
        invocation
            .key(self.keys.waiting())
            .key(self.keys.delayed())
            .arg(self.keys.job(&id))
            .arg(request.to_json()?)
            .arg(options.priority)
            .arg(available_at_ms)
            .arg(u8::from(options.delay_ms > 0))
            .arg(now.timestamp_millis())
            .arg(&id);
        let _: i64 = self
            .connection
            .execute("ADD", |mut conn| {
                let invocation = &invocation;
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        StructuredLogger::log_request_enqueued(&request, options.delay_ms);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn try_dequeue(&self) -> MonitorResult<Option<ClaimedRequest>> {
        let token = Uuid::new_v4().to_string();
        let mut invocation = self.claim_script.prepare_invoke();
        invocation
            .key(self.keys.waiting())
            .key(self.keys.delayed())
            .key(self.keys.active())
            .arg(self.keys.base())
            .arg(Utc::now().timestamp_millis())
            .arg(self.lock_duration_ms())
            .arg(&token);

        let claimed: Option<(String, String, String, String)> = self
            .connection
            .execute("CLAIM", |mut conn| {
                let invocation = &invocation;
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        let Some((id, data, attempts_made, failed_reason)) = claimed else {
            return Ok(None);
        };

        let mut request = match CollectionRequest::from_json(&data) {
            Ok(request) => request,
            Err(err) => {
                self.discard_malformed(&id, &token, &err).await?;
                return Ok(None);
            }
        };
        request.attempts_made = attempts_made.parse().unwrap_or(request.attempts_made);
        request.failed_reason = (!failed_reason.is_empty()).then_some(failed_reason);

        StructuredLogger::log_request_claimed(&request);
        Ok(Some(ClaimedRequest {
            request,
            handle: AckHandle {
                request_id: id,
                lock_token: token,
            },
        }))
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    #[instrument(skip(self, handle), fields(request.id = %handle.request_id))]
    async fn ack(&self, handle: &AckHandle) -> MonitorResult<()> {
        let mut invocation = self.ack_script.prepare_invoke();
        invocation
            .key(self.keys.active())
            .key(self.keys.completed())
            .arg(self.keys.base())
            .arg(&handle.request_id)
            .arg(&handle.lock_token)
            .arg(Utc::now().timestamp_millis())
            .arg(self.config.remove_on_complete);

        let acknowledged: i64 = self
            .connection
            .execute("ACK", |mut conn| {
                let invocation = &invocation;
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        if acknowledged == 0 {
            warn!(request.id = %handle.request_id, "Lock lost before ack");
            return Err(MonitorError::LockLost {
                request_id: handle.request_id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, handle, error), fields(request.id = %handle.request_id))]
    async fn nack(&self, handle: &AckHandle, error: &ErrorRecord) -> MonitorResult<RetryDecision> {
        let status = self
            .find(&handle.request_id)
            .await?
            .ok_or_else(|| MonitorError::RequestNotFound {
                id: handle.request_id.clone(),
            })?;
        let decision = status.request.decide_after_failure();
        let (attempts, dead, delay_ms) = match decision {
            RetryDecision::Retry { attempt, delay } => (attempt, 0u8, delay.as_millis() as u64),
            RetryDecision::DeadLetter { attempts } => (attempts, 1u8, 0u64),
        };

        let mut invocation = self.nack_script.prepare_invoke();
        invocation
            .key(self.keys.active())
            .key(self.keys.delayed())
            .key(self.keys.failed())
            .arg(self.keys.base())
            .arg(&handle.request_id)
            .arg(&handle.lock_token)
            .arg(Utc::now().timestamp_millis())
            .arg(attempts)
            .arg(dead)
            .arg(delay_ms)
            .arg(error.message.as_str())
            .arg(self.config.remove_on_fail);

        let applied: i64 = self
            .connection
            .execute("NACK", |mut conn| {
                let invocation = &invocation;
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        if applied == 0 {
            warn!(request.id = %handle.request_id, "Lock lost before nack");
            return Err(MonitorError::LockLost {
                request_id: handle.request_id.clone(),
            });
        }

        StructuredLogger::log_retry_decision(&handle.request_id, &decision);
        Ok(decision)
    }

    async fn find(&self, request_id: &str) -> MonitorResult<Option<RequestStatus>> {
        let job_key = self.keys.job(request_id);
        let fields: (Option<String>, Option<String>, Option<String>, Option<String>) = self
            .connection
            .execute("HMGET", |mut conn| {
                let job_key = job_key.clone();
                async move {
                    redis::cmd("HMGET")
                        .arg(job_key)
                        .arg("data")
                        .arg("state")
                        .arg("attempts_made")
                        .arg("failed_reason")
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;

        let (Some(data), Some(state)) = (fields.0, fields.1) else {
            return Ok(None);
        };
        let mut request = CollectionRequest::from_json(&data)?;
        if let Some(attempts) = fields.2.and_then(|a| a.parse().ok()) {
            request.attempts_made = attempts;
        }
        request.failed_reason = fields.3.filter(|reason| !reason.is_empty());

        Ok(Some(RequestStatus {
            request,
            state: state.parse::<RequestState>()?,
        }))
    }

    async fn counts(&self) -> MonitorResult<QueueCounts> {
        let mut pipe = redis::pipe();
        pipe.cmd("ZCARD")
            .arg(self.keys.waiting())
            .cmd("ZCARD")
            .arg(self.keys.delayed())
            .cmd("ZCARD")
            .arg(self.keys.active())
            .cmd("LLEN")
            .arg(self.keys.completed())
            .cmd("LLEN")
            .arg(self.keys.failed());

        let (waiting, delayed, active, completed, failed): (u64, u64, u64, u64, u64) = self
            .connection
            .execute("COUNTS", |mut conn| {
                let pipe = &pipe;
                async move { pipe.query_async(&mut conn).await }
            })
            .await?;

        Ok(QueueCounts {
            waiting,
            delayed,
            active,
            completed,
            failed,
        })
    }

    async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    async fn close(&self) -> MonitorResult<()> {
        self.connection.close().await;
        Ok(())
    }
}
