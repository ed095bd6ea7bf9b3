use async_trait::async_trait;

use crate::{models::RawMetrics, MonitorResult};

/// 主机指标源，一次调用返回一次时间点读数
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn read(&self) -> MonitorResult<RawMetrics>;

    fn name(&self) -> &str;
}
