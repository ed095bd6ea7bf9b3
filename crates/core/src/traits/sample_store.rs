use async_trait::async_trait;

use crate::{
    models::{DateRange, NewResourceSample, ResourceSample},
    MonitorResult,
};

/// 采样存储：只追加的时间序列表
///
/// 所有查询结果按 `created_at` 倒序，时间相同按 `id` 倒序。
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// 插入一条采样并返回带ID的记录
    async fn insert(&self, sample: &NewResourceSample) -> MonitorResult<ResourceSample>;

    /// 分页查询
    async fn list(
        &self,
        range: &DateRange,
        limit: u32,
        offset: u64,
    ) -> MonitorResult<Vec<ResourceSample>>;

    async fn count(&self, range: &DateRange) -> MonitorResult<u64>;

    /// 范围内的全部采样
    async fn find_in_range(&self, range: &DateRange) -> MonitorResult<Vec<ResourceSample>>;

    async fn latest(&self) -> MonitorResult<Option<ResourceSample>>;

    async fn health_check(&self) -> MonitorResult<()>;
}
