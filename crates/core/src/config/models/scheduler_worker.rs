use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// 定时触发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 5 段（分 时 日 月 周）或带秒的 6/7 段表达式
    pub cron: String,
    /// IANA 时区名
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 6 * * *".to_string(),
            timezone: "Asia/Jakarta".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cron.trim().is_empty() {
            return Err(anyhow::anyhow!("CRON表达式不能为空"));
        }

        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("无效的时区: {}", self.timezone))
    }
}

/// cpu_usage 字段保存的指标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CpuMetric {
    /// 全局 CPU 使用率百分比（0-100）
    #[default]
    UsagePercent,
    /// 1 分钟平均负载
    LoadAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 为空时使用 主机名-进程ID
    pub worker_id: Option<String>,
    /// 单进程并发数，只允许 1
    pub concurrency: u32,
    pub cpu_metric: CpuMetric,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: None,
            concurrency: 1,
            cpu_metric: CpuMetric::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency != 1 {
            return Err(anyhow::anyhow!(
                "Worker并发数必须为1，当前为: {}",
                self.concurrency
            ));
        }

        if let Some(worker_id) = &self.worker_id {
            if worker_id.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker ID不能为空"));
            }
        }

        Ok(())
    }
}
