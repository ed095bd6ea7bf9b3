use serde::{Deserialize, Serialize};

use crate::models::{BackoffPolicy, EnqueueOptions, RetryPolicy};

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    /// 重连初始延迟（毫秒）
    pub reconnect_initial_delay_ms: u64,
    /// 重连最大延迟（毫秒）
    pub reconnect_max_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

impl RedisConfig {
    /// Validate Redis configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.reconnect_initial_delay_ms == 0 {
            return Err(anyhow::anyhow!("Redis重连延迟必须大于0"));
        }

        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            return Err(anyhow::anyhow!("Redis最大重连延迟不能小于初始延迟"));
        }

        Ok(())
    }

    /// Build Redis connection URL
    pub fn build_url(&self) -> String {
        let auth = match &self.password {
            Some(password) if !password.is_empty() => format!(":{password}@"),
            _ => String::new(),
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        )
    }
}

/// 工作队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 队列名称
    pub name: String,
    /// Redis 键前缀
    pub key_prefix: String,
    pub redis: RedisConfig,
    pub priority: i32,
    pub max_attempts: u32,
    pub backoff_delay_ms: u64,
    /// 保留最近完成的请求数
    pub remove_on_complete: u32,
    /// 保留最近失败的请求数
    pub remove_on_fail: u32,
    /// 领取锁有效期，过期后请求会被重新投递
    pub lock_duration_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "resource-usage".to_string(),
            key_prefix: "resource-status".to_string(),
            redis: RedisConfig::default(),
            priority: 1,
            max_attempts: 3,
            backoff_delay_ms: 2000,
            remove_on_complete: 10,
            remove_on_fail: 5,
            lock_duration_seconds: 30,
            poll_interval_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("队列名称不能为空"));
        }

        if self.key_prefix.is_empty() {
            return Err(anyhow::anyhow!("队列键前缀不能为空"));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }

        if self.backoff_delay_ms == 0 {
            return Err(anyhow::anyhow!("退避基准延迟必须大于0"));
        }

        if self.lock_duration_seconds == 0 {
            return Err(anyhow::anyhow!("锁有效期必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        self.redis.validate()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: BackoffPolicy::exponential(self.backoff_delay_ms),
        }
    }

    /// 采集任务固定使用的入队选项
    pub fn enqueue_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            priority: self.priority,
            delay_ms: 0,
        }
    }
}
