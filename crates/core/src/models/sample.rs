use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已持久化的一次资源采样
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub id: u64,
    pub cpu_usage: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_used_mb: u64,
    pub disk_total_mb: u64,
    pub created_at: DateTime<Utc>,
}

impl ResourceSample {
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_mb, self.memory_total_mb)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_mb, self.disk_total_mb)
    }
}

/// 待插入的采样，id 由存储分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResourceSample {
    pub cpu_usage: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub disk_used_mb: u64,
    pub disk_total_mb: u64,
    pub created_at: DateTime<Utc>,
}

impl NewResourceSample {
    pub fn with_id(self, id: u64) -> ResourceSample {
        ResourceSample {
            id,
            cpu_usage: self.cpu_usage,
            memory_used_mb: self.memory_used_mb,
            memory_total_mb: self.memory_total_mb,
            disk_used_mb: self.disk_used_mb,
            disk_total_mb: self.disk_total_mb,
            created_at: self.created_at,
        }
    }
}

/// 单个挂载点的容量信息（字节）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemUsage {
    pub mount: String,
    pub used_bytes: u64,
    pub size_bytes: u64,
}

/// 指标源返回的原始读数（字节）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub cpu_load: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub filesystems: Vec<FilesystemUsage>,
}

/// 闭区间时间范围，两端均可省略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *at >= start) && self.end.map_or(true, |end| *at <= end)
    }
}

/// used / total * 100，总量为 0 时记为 0
pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}
