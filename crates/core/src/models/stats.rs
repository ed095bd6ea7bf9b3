use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::ResourceSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        (count > 0).then(|| Self {
            avg: sum / count as f64,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 一段时间内的 CPU、内存百分比、磁盘百分比统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub cpu: MetricSummary,
    pub memory: MetricSummary,
    pub disk: MetricSummary,
    pub total_records: usize,
    pub date_range: StatsDateRange,
}

impl UsageStats {
    /// 没有样本时返回 None
    pub fn from_samples(samples: &[ResourceSample]) -> Option<Self> {
        let cpu = MetricSummary::from_values(samples.iter().map(|s| s.cpu_usage))?;
        let memory = MetricSummary::from_values(samples.iter().map(|s| s.memory_percent()))?;
        let disk = MetricSummary::from_values(samples.iter().map(|s| s.disk_percent()))?;
        let start = samples.iter().map(|s| s.created_at).min()?;
        let end = samples.iter().map(|s| s.created_at).max()?;

        Some(Self {
            cpu,
            memory,
            disk,
            total_records: samples.len(),
            date_range: StatsDateRange { start, end },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: u64, cpu: f64, mem: (u64, u64), disk: (u64, u64), hour: u32) -> ResourceSample {
        ResourceSample {
            id,
            cpu_usage: cpu,
            memory_used_mb: mem.0,
            memory_total_mb: mem.1,
            disk_used_mb: disk.0,
            disk_total_mb: disk.1,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_samples_have_no_stats() {
        assert!(UsageStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_stats_are_hand_computed_values() {
        let samples = vec![
            sample(3, 30.0, (768, 1024), (500, 1000), 12),
            sample(2, 20.0, (512, 1024), (250, 1000), 6),
            sample(1, 10.0, (256, 1024), (750, 1000), 0),
        ];
        let stats = UsageStats::from_samples(&samples).unwrap();

        assert_eq!(stats.cpu.avg, 20.0);
        assert_eq!(stats.cpu.min, 10.0);
        assert_eq!(stats.cpu.max, 30.0);
        assert_eq!(stats.memory.avg, 50.0);
        assert_eq!(stats.memory.min, 25.0);
        assert_eq!(stats.memory.max, 75.0);
        assert_eq!(stats.disk.avg, 50.0);
        assert_eq!(stats.disk.min, 25.0);
        assert_eq!(stats.disk.max, 75.0);
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.date_range.start, samples[2].created_at);
        assert_eq!(stats.date_range.end, samples[0].created_at);
    }

    #[test]
    fn test_zero_total_counts_as_zero_percent() {
        let samples = vec![sample(1, 5.0, (0, 0), (10, 0), 1)];
        let stats = UsageStats::from_samples(&samples).unwrap();
        assert_eq!(stats.memory.max, 0.0);
        assert_eq!(stats.disk.avg, 0.0);
    }

    #[test]
    fn test_stats_json_shape() {
        let stats = UsageStats::from_samples(&[sample(1, 5.0, (1, 2), (1, 4), 1)]).unwrap();
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalRecords"], 1);
        assert!(value["dateRange"]["start"].is_string());
        assert_eq!(value["disk"]["avg"], 25.0);
    }
}
