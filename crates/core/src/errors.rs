use thiserror::Error;

/// 资源监控系统错误类型定义
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("队列错误: {0}")]
    Queue(String),

    #[error("队列连接不可用: {0}")]
    QueueUnavailable(String),

    #[error("任务锁已失效: {request_id}")]
    LockLost { request_id: String },

    #[error("采集请求未找到: {id}")]
    RequestNotFound { id: String },

    #[error("系统指标采集失败: {0}")]
    MetricsSource(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的时区: {0}")]
    InvalidTimezone(String),

    #[error("无效的任务负载: {0}")]
    InvalidPayload(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl MonitorError {
    /// 错误类别名称，用于结构化日志中的 `name` 字段
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Database(_) => "DatabaseError",
            MonitorError::Queue(_) => "QueueError",
            MonitorError::QueueUnavailable(_) => "QueueUnavailableError",
            MonitorError::LockLost { .. } => "LockLostError",
            MonitorError::RequestNotFound { .. } => "RequestNotFoundError",
            MonitorError::MetricsSource(_) => "MetricsSourceError",
            MonitorError::InvalidCron { .. } => "InvalidCronError",
            MonitorError::InvalidTimezone(_) => "InvalidTimezoneError",
            MonitorError::InvalidPayload(_) => "InvalidPayloadError",
            MonitorError::Serialization(_) => "SerializationError",
            MonitorError::Configuration(_) => "ConfigurationError",
            MonitorError::Internal(_) => "InternalError",
        }
    }

    /// 基础设施暂时不可用，可以通过重连恢复
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::QueueUnavailable(_)
                | MonitorError::Database(sqlx::Error::PoolTimedOut)
                | MonitorError::Database(sqlx::Error::Io(_))
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
