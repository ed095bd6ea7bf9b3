use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use resource_status_core::{
    config::QueueConfig, AckHandle, ClaimedRequest, CollectionPayload, CollectionRequest,
    ConnectionState, EnqueueOptions, ErrorRecord, JobKind, MonitorError, MonitorResult,
    QueueCounts, RequestState, RequestStatus, RetryDecision, RetryPolicy, WorkQueue,
};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::observability::StructuredLogger;

/// 内存队列配置
#[derive(Debug, Clone)]
pub struct InMemoryQueueConfig {
    pub retry_policy: RetryPolicy,
    pub lock_duration: Duration,
    pub remove_on_complete: usize,
    pub remove_on_fail: usize,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for InMemoryQueueConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            retry_policy: config.retry_policy(),
            lock_duration: Duration::from_secs(config.lock_duration_seconds),
            remove_on_complete: config.remove_on_complete as usize,
            remove_on_fail: config.remove_on_fail as usize,
        }
    }
}

#[derive(Debug)]
struct StoredRequest {
    request: CollectionRequest,
    state: RequestState,
    available_at: Instant,
    sequence: u64,
    lock: Option<(String, Instant)>,
}

impl StoredRequest {
    /// 当前是否可以被领取：待处理、延迟到期、或锁已过期
    fn is_claimable(&self, now: Instant) -> bool {
        match self.state {
            RequestState::Waiting => true,
            RequestState::Delayed => self.available_at <= now,
            RequestState::Active => self.lock.as_ref().is_some_and(|(_, until)| *until <= now),
            RequestState::Completed | RequestState::Failed => false,
        }
    }

    fn holds_lock(&self, token: &str) -> bool {
        self.state == RequestState::Active
            && self.lock.as_ref().is_some_and(|(held, _)| held == token)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    requests: HashMap<String, StoredRequest>,
    completed: VecDeque<String>,
    failed: VecDeque<String>,
    closed: bool,
}

impl QueueState {
    fn ensure_open(&self) -> MonitorResult<()> {
        if self.closed {
            Err(MonitorError::QueueUnavailable("队列已关闭".to_string()))
        } else {
            Ok(())
        }
    }

    fn claim(&mut self, now: Instant, lock_duration: Duration) -> Option<ClaimedRequest> {
        let id = self
            .requests
            .iter()
            .filter(|(_, stored)| stored.is_claimable(now))
            .min_by_key(|(_, stored)| {
                (stored.request.priority, stored.available_at, stored.sequence)
            })
            .map(|(id, _)| id.clone())?;

        let stored = self.requests.get_mut(&id)?;
        if stored.state == RequestState::Active {
            debug!(request.id = %id, "锁已过期，重新投递");
        }
        let token = Uuid::new_v4().to_string();
        stored.state = RequestState::Active;
        stored.lock = Some((token.clone(), now + lock_duration));

        Some(ClaimedRequest {
            request: stored.request.clone(),
            handle: AckHandle {
                request_id: id,
                lock_token: token,
            },
        })
    }

    /// 下一次可能有请求变为可领取的时间
    fn next_wakeup(&self) -> Option<Instant> {
        self.requests
            .values()
            .filter_map(|stored| match stored.state {
                RequestState::Delayed => Some(stored.available_at),
                RequestState::Active => stored.lock.as_ref().map(|(_, until)| *until),
                _ => None,
            })
            .min()
    }

    fn retire(&mut self, id: &str, state: RequestState, keep: usize) {
        let list = if state == RequestState::Completed {
            &mut self.completed
        } else {
            &mut self.failed
        };
        list.push_front(id.to_string());
        while list.len() > keep {
            if let Some(expired) = list.pop_back() {
                self.requests.remove(&expired);
            }
        }
    }
}

/// 内存工作队列
///
/// 与 Redis 队列语义一致（优先级、延迟、锁、重试退避、死信、保留数量），
/// 用于测试和单进程部署。时间使用 `tokio::time::Instant`，测试中可以暂停时钟。
pub struct InMemoryWorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    config: InMemoryQueueConfig,
    next_id: AtomicU64,
    connection_state: RwLock<ConnectionState>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::with_config(InMemoryQueueConfig::default())
    }

    pub fn with_config(config: InMemoryQueueConfig) -> Self {
        info!("Creating in-memory work queue with config: {:?}", config);
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            config,
            next_id: AtomicU64::new(1),
            connection_state: RwLock::new(ConnectionState::Ready),
        }
    }
}

impl Default for InMemoryWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: CollectionPayload,
        options: EnqueueOptions,
    ) -> MonitorResult<String> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = sequence.to_string();
        let request = CollectionRequest::new(
            &id,
            kind,
            payload,
            &options,
            &self.config.retry_policy,
            Utc::now(),
        );
        let delay = Duration::from_millis(options.delay_ms);
        StructuredLogger::log_request_enqueued(&request, options.delay_ms);

        state.requests.insert(
            id.clone(),
            StoredRequest {
                request,
                state: if delay.is_zero() {
                    RequestState::Waiting
                } else {
                    RequestState::Delayed
                },
                available_at: Instant::now() + delay,
                sequence,
                lock: None,
            },
        );
        drop(state);

        self.notify.notify_one();
        Ok(id)
    }

    async fn try_dequeue(&self) -> MonitorResult<Option<ClaimedRequest>> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let claimed = state.claim(Instant::now(), self.config.lock_duration);
        if let Some(claimed) = &claimed {
            StructuredLogger::log_request_claimed(&claimed.request);
        }
        Ok(claimed)
    }

    async fn dequeue(&self) -> MonitorResult<ClaimedRequest> {
        loop {
            let wakeup = {
                let mut state = self.state.lock().await;
                state.ensure_open()?;
                if let Some(claimed) = state.claim(Instant::now(), self.config.lock_duration) {
                    StructuredLogger::log_request_claimed(&claimed.request);
                    return Ok(claimed);
                }
                state.next_wakeup()
            };

            match wakeup {
                Some(deadline) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn ack(&self, handle: &AckHandle) -> MonitorResult<()> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        let stored = state
            .requests
            .get_mut(&handle.request_id)
            .filter(|stored| stored.holds_lock(&handle.lock_token))
            .ok_or_else(|| MonitorError::LockLost {
                request_id: handle.request_id.clone(),
            })?;
        stored.state = RequestState::Completed;
        stored.lock = None;

        let keep = self.config.remove_on_complete;
        state.retire(&handle.request_id, RequestState::Completed, keep);
        Ok(())
    }

    async fn nack(&self, handle: &AckHandle, error: &ErrorRecord) -> MonitorResult<RetryDecision> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        let stored = state
            .requests
            .get_mut(&handle.request_id)
            .filter(|stored| stored.holds_lock(&handle.lock_token))
            .ok_or_else(|| MonitorError::LockLost {
                request_id: handle.request_id.clone(),
            })?;

        let decision = stored.request.decide_after_failure();
        stored.lock = None;
        stored.request.failed_reason = Some(error.message.clone());
        match decision {
            RetryDecision::Retry { attempt, delay } => {
                stored.request.attempts_made = stored.request.attempts_made.max(attempt);
                stored.state = RequestState::Delayed;
                stored.available_at = Instant::now() + delay;
            }
            RetryDecision::DeadLetter { attempts } => {
                stored.request.attempts_made = stored.request.attempts_made.max(attempts);
                stored.state = RequestState::Failed;
                let keep = self.config.remove_on_fail;
                state.retire(&handle.request_id, RequestState::Failed, keep);
            }
        }
        drop(state);

        StructuredLogger::log_retry_decision(&handle.request_id, &decision);
        self.notify.notify_one();
        Ok(decision)
    }

    async fn find(&self, request_id: &str) -> MonitorResult<Option<RequestStatus>> {
        let state = self.state.lock().await;
        Ok(state.requests.get(request_id).map(|stored| RequestStatus {
            request: stored.request.clone(),
            state: stored.state,
        }))
    }

    async fn counts(&self) -> MonitorResult<QueueCounts> {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for stored in state.requests.values() {
            match stored.state {
                RequestState::Waiting => counts.waiting += 1,
                RequestState::Delayed => counts.delayed += 1,
                RequestState::Active => counts.active += 1,
                RequestState::Completed => counts.completed += 1,
                RequestState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn close(&self) -> MonitorResult<()> {
        self.state.lock().await.closed = true;
        *self.connection_state.write().await = ConnectionState::Closed;
        self.notify.notify_waiters();
        self.notify.notify_one();
        Ok(())
    }
}
