use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::MonitorError;

/// 归一化后的错误记录，记录日志或写入队列前统一转换成这个结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub name: String,
    pub message: String,
    pub cause: Option<String>,
    /// 从外到内的完整错误链
    pub trace: Vec<String>,
}

impl ErrorRecord {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            trace: vec![message.clone()],
            message,
            cause: None,
        }
    }

    /// 从任意标准错误构建，沿 `source()` 展开错误链
    pub fn from_std(name: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let mut trace = vec![err.to_string()];
        let mut source = err.source();
        while let Some(inner) = source {
            trace.push(inner.to_string());
            source = inner.source();
        }
        Self {
            name: name.into(),
            message: err.to_string(),
            cause: err.source().map(|s| s.to_string()),
            trace,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let trace: Vec<String> = err.chain().map(|e| e.to_string()).collect();
        Self {
            name: "Error".to_string(),
            message: err.to_string(),
            cause: trace.get(1).cloned(),
            trace,
        }
    }

    /// 完整错误链，用 " <- " 连接
    pub fn trace_string(&self) -> String {
        self.trace.join(" <- ")
    }
}

impl From<&MonitorError> for ErrorRecord {
    fn from(err: &MonitorError) -> Self {
        ErrorRecord::from_std(err.kind(), err)
    }
}

impl From<MonitorError> for ErrorRecord {
    fn from(err: MonitorError) -> Self {
        ErrorRecord::from(&err)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_monitor_error_keeps_cause() {
        let err = MonitorError::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        let record = ErrorRecord::from(&err);
        assert_eq!(record.name, "DatabaseError");
        assert!(record.message.starts_with("数据库错误"));
        assert!(record.cause.is_some());
        assert!(record.trace.len() >= 2);
    }

    #[test]
    fn test_record_without_source() {
        let record = ErrorRecord::from(MonitorError::MetricsSource("no disks".to_string()));
        assert_eq!(record.name, "MetricsSourceError");
        assert_eq!(record.cause, None);
        assert_eq!(record.trace, vec![record.message.clone()]);
    }

    #[test]
    fn test_record_from_anyhow_chain() {
        let err = anyhow::anyhow!("root").context("outer");
        let record = ErrorRecord::from_anyhow(&err);
        assert_eq!(record.message, "outer");
        assert_eq!(record.cause.as_deref(), Some("root"));
        assert_eq!(record.trace_string(), "outer <- root");
    }
}
