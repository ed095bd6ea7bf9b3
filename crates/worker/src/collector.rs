//! 主机指标采集与归一化

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use resource_status_core::{
    config::CpuMetric, FilesystemUsage, MetricsSource, MonitorError, MonitorResult,
    NewResourceSample, RawMetrics,
};
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// 基于 sysinfo 的本机指标源
pub struct SysinfoMetricsSource {
    cpu_metric: CpuMetric,
}

impl SysinfoMetricsSource {
    pub fn new(cpu_metric: CpuMetric) -> Self {
        Self { cpu_metric }
    }

    fn read_blocking(cpu_metric: CpuMetric) -> RawMetrics {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );

        let cpu_load = match cpu_metric {
            CpuMetric::UsagePercent => {
                // 使用率需要两次读数的差值
                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
                sys.refresh_cpu_usage();
                f64::from(sys.global_cpu_usage())
            }
            CpuMetric::LoadAverage => System::load_average().one,
        };

        let disks = Disks::new_with_refreshed_list();
        let filesystems = disks
            .list()
            .iter()
            .map(|disk| {
                let size_bytes = disk.total_space();
                FilesystemUsage {
                    mount: disk.mount_point().to_string_lossy().into_owned(),
                    used_bytes: size_bytes.saturating_sub(disk.available_space()),
                    size_bytes,
                }
            })
            .collect();

        RawMetrics {
            cpu_load,
            memory_used_bytes: sys.used_memory(),
            memory_total_bytes: sys.total_memory(),
            filesystems,
        }
    }
}

impl Default for SysinfoMetricsSource {
    fn default() -> Self {
        Self::new(CpuMetric::default())
    }
}

#[async_trait]
impl MetricsSource for SysinfoMetricsSource {
    async fn read(&self) -> MonitorResult<RawMetrics> {
        let cpu_metric = self.cpu_metric;
        let raw = tokio::task::spawn_blocking(move || Self::read_blocking(cpu_metric))
            .await
            .map_err(|e| MonitorError::MetricsSource(format!("读取主机指标失败: {e}")))?;

        debug!(
            cpu_load = raw.cpu_load,
            memory_used_bytes = raw.memory_used_bytes,
            filesystems = raw.filesystems.len(),
            "读取主机指标"
        );
        Ok(raw)
    }

    fn name(&self) -> &str {
        "sysinfo"
    }
}

/// 字节转换为整数MB，四舍五入（0.5 进位）
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB + u64::from(bytes % BYTES_PER_MB >= BYTES_PER_MB / 2)
}

/// 优先选择根挂载点，否则取第一个
pub fn select_filesystem(filesystems: &[FilesystemUsage]) -> Option<&FilesystemUsage> {
    filesystems
        .iter()
        .find(|fs| fs.mount == "/")
        .or_else(|| filesystems.first())
}

/// 原始读数归一化为待插入的采样，时间精确到毫秒
pub fn normalize(raw: &RawMetrics, created_at: DateTime<Utc>) -> MonitorResult<NewResourceSample> {
    let disk = select_filesystem(&raw.filesystems)
        .ok_or_else(|| MonitorError::MetricsSource("没有可用的文件系统信息".to_string()))?;
    if !raw.cpu_load.is_finite() {
        return Err(MonitorError::MetricsSource(format!(
            "CPU读数无效: {}",
            raw.cpu_load
        )));
    }

    Ok(NewResourceSample {
        cpu_usage: raw.cpu_load,
        memory_used_mb: bytes_to_mb(raw.memory_used_bytes),
        memory_total_mb: bytes_to_mb(raw.memory_total_bytes),
        disk_used_mb: bytes_to_mb(disk.used_bytes),
        disk_total_mb: bytes_to_mb(disk.size_bytes),
        created_at: created_at.trunc_subsecs(3),
    })
}
