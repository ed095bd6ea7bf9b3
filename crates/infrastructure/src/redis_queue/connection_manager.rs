use std::future::Future;
use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, RedisResult};
use resource_status_core::{
    config::RedisConfig, ConnectionState, MonitorError, MonitorResult,
};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::observability::StructuredLogger;

/// Redis 连接管理
///
/// 连接失败或命令因连接问题失败时无限重试，间隔指数增长并带随机抖动，
/// 只有 `close()` 之后才会放弃。状态变化会记录日志并可通过 `state()` 查询。
pub struct RedisConnectionManager {
    client: Client,
    config: RedisConfig,
    connection: Mutex<Option<ConnectionManager>>,
    state: RwLock<ConnectionState>,
}

impl RedisConnectionManager {
    pub fn new(config: RedisConfig) -> MonitorResult<Self> {
        let client = Client::open(config.build_url())
            .map_err(|e| MonitorError::Queue(format!("Failed to create Redis client: {e}")))?;

        Ok(Self {
            client,
            config,
            connection: Mutex::new(None),
            state: RwLock::new(ConnectionState::Connecting),
        })
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Closed 是终态，进行中的重试不能把它改回去
    async fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != next && *state != ConnectionState::Closed {
            StructuredLogger::log_connection_state(&self.config.host, self.config.port, *state, next);
            *state = next;
        }
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let initial = self.config.reconnect_initial_delay_ms;
        let max = self.config.reconnect_max_delay_ms;
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let base = initial.saturating_mul(factor).min(max);
        let jitter = rand::rng().random_range(0..=base / 4);
        Duration::from_millis(base.saturating_add(jitter).min(max))
    }

    /// 建立连接，失败时无限重试直到成功或连接被关闭
    pub async fn connect(&self) -> MonitorResult<ConnectionManager> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let mut attempt = 0u32;
        loop {
            if self.state().await == ConnectionState::Closed {
                return Err(MonitorError::QueueUnavailable(
                    "Redis connection closed".to_string(),
                ));
            }

            match ConnectionManager::new(self.client.clone()).await {
                Ok(conn) => {
                    debug!(
                        "Successfully connected to Redis at {}:{}",
                        self.config.host, self.config.port
                    );
                    *guard = Some(conn.clone());
                    self.transition(ConnectionState::Ready).await;
                    return Ok(conn);
                }
                Err(e) => {
                    let delay = self.reconnect_delay(attempt);
                    StructuredLogger::log_reconnect_attempt(
                        &self.config.host,
                        self.config.port,
                        attempt + 1,
                        delay.as_millis() as u64,
                        &e.to_string(),
                    );
                    if attempt > 0 {
                        self.transition(ConnectionState::Reconnecting).await;
                    }
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
            }
        }
    }

    /// 执行一个 Redis 操作，连接类错误会无限重试
    pub async fn execute<T, F, Fut>(&self, operation: &str, f: F) -> MonitorResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let conn = self.connect().await?;
            match f(conn).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("Redis operation {} succeeded after {} retries", operation, attempt);
                    }
                    self.transition(ConnectionState::Ready).await;
                    return Ok(value);
                }
                Err(e) if is_connection_error(&e) => {
                    if self.state().await == ConnectionState::Closed {
                        return Err(MonitorError::QueueUnavailable(
                            "Redis connection closed".to_string(),
                        ));
                    }
                    self.transition(ConnectionState::Reconnecting).await;
                    let delay = self.reconnect_delay(attempt);
                    warn!(
                        "Redis operation {} failed with connection error: {}. Retrying in {}ms...",
                        operation,
                        e,
                        delay.as_millis()
                    );
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
                Err(e) => {
                    return Err(MonitorError::Queue(format!(
                        "Redis operation {operation} failed: {e}"
                    )));
                }
            }
        }
    }

    pub async fn ping(&self) -> MonitorResult<()> {
        let response: String = self
            .execute("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(MonitorError::Queue(format!(
                "Unexpected PING response: {response}"
            )))
        }
    }

    pub async fn close(&self) {
        self.transition(ConnectionState::Closed).await;
        self.connection.lock().await.take();
    }
}

fn is_connection_error(err: &RedisError) -> bool {
    err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_io_error()
        || err.is_timeout()
}
