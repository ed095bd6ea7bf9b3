use std::time::Duration;

use async_trait::async_trait;

use crate::{
    logging::ErrorRecord,
    models::{
        AckHandle, ClaimedRequest, CollectionPayload, ConnectionState, EnqueueOptions, JobKind,
        QueueCounts, RequestStatus, RetryDecision,
    },
    MonitorResult,
};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// 持久化、带优先级、至少一次投递的工作队列
///
/// 请求按优先级（数值小者优先）再按可领取时间排序。被领取的请求带锁，
/// 同一时刻只能被一个 Worker 持有；锁过期的请求会被重新投递。
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// 入队并返回新请求ID
    async fn enqueue(
        &self,
        kind: JobKind,
        payload: CollectionPayload,
        options: EnqueueOptions,
    ) -> MonitorResult<String>;

    /// 尝试领取一个可处理的请求，没有时立即返回 None
    async fn try_dequeue(&self) -> MonitorResult<Option<ClaimedRequest>>;

    /// 阻塞直到领取到一个请求
    async fn dequeue(&self) -> MonitorResult<ClaimedRequest> {
        loop {
            if let Some(claimed) = self.try_dequeue().await? {
                return Ok(claimed);
            }
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// 确认处理成功
    async fn ack(&self, handle: &AckHandle) -> MonitorResult<()>;

    /// 报告处理失败，返回队列采取的动作
    async fn nack(&self, handle: &AckHandle, error: &ErrorRecord) -> MonitorResult<RetryDecision>;

    /// 查询请求及其当前状态
    async fn find(&self, request_id: &str) -> MonitorResult<Option<RequestStatus>>;

    async fn counts(&self) -> MonitorResult<QueueCounts>;

    async fn connection_state(&self) -> ConnectionState;

    /// 关闭连接，之后的操作都会失败
    async fn close(&self) -> MonitorResult<()>;
}
