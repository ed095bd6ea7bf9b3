use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use resource_status_core::{
    AckHandle, ClaimedRequest, CollectionRequest, ConnectionState, ErrorRecord, MetricsSource, MonitorError,
    MonitorResult, ResourceSample, RetryDecision, SampleStore, WorkQueue,
};
use resource_status_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::collector::normalize;

/// 单个请求的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Claimed,
    Collecting,
    Persisting,
    Acked,
    Nacked,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Claimed => "claimed",
            ProcessingStage::Collecting => "collecting",
            ProcessingStage::Persisting => "persisting",
            ProcessingStage::Acked => "acked",
            ProcessingStage::Nacked => "nacked",
        }
    }
}

/// Worker 处理结果事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Completed {
        request_id: String,
        sample_id: u64,
    },
    Failed {
        request_id: String,
        error: ErrorRecord,
        /// 队列拒绝 nack（例如锁已丢失）时为 None
        decision: Option<RetryDecision>,
    },
}

impl WorkerEvent {
    pub fn request_id(&self) -> &str {
        match self {
            WorkerEvent::Completed { request_id, .. } | WorkerEvent::Failed { request_id, .. } => {
                request_id
            }
        }
    }
}

/// 默认的 Worker ID：主机名-进程ID
pub fn default_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}-{}", host, std::process::id())
}

/// Worker服务构建器
pub struct CollectionWorkerBuilder {
    worker_id: String,
    queue: Arc<dyn WorkQueue>,
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn SampleStore>,
    metrics: Option<Arc<MetricsCollector>>,
    event_capacity: usize,
}

impl CollectionWorkerBuilder {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            worker_id: default_worker_id(),
            queue,
            source,
            store,
            metrics: None,
            event_capacity: 64,
        }
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 事件通道容量，慢订阅者会丢失最旧的事件
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> CollectionWorker {
        let (events, _) = broadcast::channel(self.event_capacity);
        CollectionWorker {
            worker_id: self.worker_id,
            queue: self.queue,
            source: self.source,
            store: self.store,
            metrics: self.metrics.unwrap_or_default(),
            events,
        }
    }
}

/// 采集 Worker：逐个领取请求、采集、写入、确认
pub struct CollectionWorker {
    worker_id: String,
    queue: Arc<dyn WorkQueue>,
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn SampleStore>,
    metrics: Arc<MetricsCollector>,
    events: broadcast::Sender<WorkerEvent>,
}

impl CollectionWorker {
    pub fn builder(
        queue: Arc<dyn WorkQueue>,
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn SampleStore>,
    ) -> CollectionWorkerBuilder {
        CollectionWorkerBuilder::new(queue, source, store)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// 消费循环，收到停止信号后在当前请求处理完成时退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> MonitorResult<()> {
        info!(
            worker.id = %self.worker_id,
            source = self.source.name(),
            "Worker 开始消费采集请求"
        );

        loop {
            let claimed = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(worker.id = %self.worker_id, "Worker 收到停止信号");
                    break;
                }
                claimed = self.queue.dequeue() => claimed,
            };

            match claimed {
                Ok(claimed) => {
                    self.process(claimed).await;
                }
                Err(e) => {
                    if self.queue.connection_state().await == ConnectionState::Closed {
                        warn!(worker.id = %self.worker_id, "队列已关闭，Worker 退出");
                        break;
                    }
                    error!(worker.id = %self.worker_id, "领取请求失败: {}", e);
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.queue.poll_interval()) => {}
                    }
                }
            }
        }

        info!(worker.id = %self.worker_id, "Worker 已停止");
        Ok(())
    }

    /// 处理一个已领取的请求，任何失败都转换为 nack，不向外抛出
    #[instrument(skip(self, claimed), fields(request.id = %claimed.request.id, job.kind = %claimed.request.job_kind))]
    pub async fn process(&self, claimed: ClaimedRequest) -> WorkerEvent {
        let ClaimedRequest { request, handle } = claimed;
        let started = Instant::now();
        trace_stage(&request, ProcessingStage::Claimed);

        let event = match self.collect(&request).await {
            Ok(sample) => match self.queue.ack(&handle).await {
                Ok(()) => {
                    trace_stage(&request, ProcessingStage::Acked);
                    let elapsed = started.elapsed();
                    StructuredLogger::log_sample_persisted(
                        &request.id,
                        &sample,
                        elapsed.as_millis() as u64,
                    );
                    self.metrics.record_completed(
                        elapsed.as_secs_f64(),
                        sample.cpu_usage,
                        sample.memory_percent(),
                        sample.disk_percent(),
                    );
                    WorkerEvent::Completed {
                        request_id: request.id.clone(),
                        sample_id: sample.id,
                    }
                }
                Err(e) => {
                    // 样本已写入，请求会在锁过期后重新投递
                    warn!(
                        sample.id = sample.id,
                        "采样已写入但确认失败: {}", e
                    );
                    let record = ErrorRecord::from(&e);
                    self.metrics.record_failure(None);
                    WorkerEvent::Failed {
                        request_id: request.id.clone(),
                        error: record,
                        decision: None,
                    }
                }
            },
            Err(e) => self.fail(&request, &handle, e).await,
        };

        let _ = self.events.send(event.clone());
        event
    }

    async fn collect(&self, request: &CollectionRequest) -> MonitorResult<ResourceSample> {
        trace_stage(request, ProcessingStage::Collecting);
        let raw = self.source.read().await?;

        trace_stage(request, ProcessingStage::Persisting);
        let created_at = request.timestamp.unwrap_or_else(Utc::now);
        let sample = normalize(&raw, created_at)?;
        self.store.insert(&sample).await
    }

    async fn fail(
        &self,
        request: &CollectionRequest,
        handle: &AckHandle,
        err: MonitorError,
    ) -> WorkerEvent {
        trace_stage(request, ProcessingStage::Nacked);
        let record = ErrorRecord::from(&err);
        StructuredLogger::log_request_failed(&request.id, request.attempts_made + 1, &record);

        let decision = match self.queue.nack(handle, &record).await {
            Ok(decision) => Some(decision),
            Err(e) => {
                error!("报告失败时出错: {}", e);
                None
            }
        };
        self.metrics.record_failure(decision.as_ref());

        WorkerEvent::Failed {
            request_id: request.id.clone(),
            error: record,
            decision,
        }
    }
}

fn trace_stage(request: &CollectionRequest, stage: ProcessingStage) {
    debug!(
        request.id = %request.id,
        attempt = request.attempts_made + 1,
        stage = stage.as_str(),
        "请求处理阶段"
    );
}
