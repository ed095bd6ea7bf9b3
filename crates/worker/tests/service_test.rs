use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use resource_status_core::config::QueueConfig;
use resource_status_core::{
    CollectionPayload, DateRange, EnqueueOptions, FilesystemUsage, JobKind, MetricsSource,
    MonitorError, MonitorResult, NewResourceSample, RawMetrics, RequestState, ResourceSample,
    RetryDecision, SampleStore, WorkQueue,
};
use resource_status_infrastructure::{InMemoryQueueConfig, InMemoryWorkQueue};
use resource_status_worker::{CollectionWorker, WorkerEvent};
use tokio::sync::{broadcast, Mutex};

const MB: u64 = 1024 * 1024;

/// 前 `failures` 次读取失败的指标源
struct FlakySource {
    failures: u32,
    calls: AtomicU32,
}

impl FlakySource {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MetricsSource for FlakySource {
    async fn read(&self) -> MonitorResult<RawMetrics> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(MonitorError::MetricsSource("sensor unavailable".to_string()));
        }
        Ok(RawMetrics {
            cpu_load: 12.5,
            memory_used_bytes: 3 * 1024 * MB,
            memory_total_bytes: 8 * 1024 * MB,
            filesystems: vec![
                FilesystemUsage {
                    mount: "/data".to_string(),
                    used_bytes: 100 * MB,
                    size_bytes: 1000 * MB,
                },
                FilesystemUsage {
                    mount: "/".to_string(),
                    used_bytes: 20 * 1024 * MB,
                    size_bytes: 50 * 1024 * MB,
                },
            ],
        })
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<ResourceSample>>,
    next_id: AtomicU64,
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn insert(&self, sample: &NewResourceSample) -> MonitorResult<ResourceSample> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = sample.clone().with_id(id);
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn list(
        &self,
        range: &DateRange,
        limit: u32,
        offset: u64,
    ) -> MonitorResult<Vec<ResourceSample>> {
        let rows = self.find_in_range(range).await?;
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, range: &DateRange) -> MonitorResult<u64> {
        Ok(self.find_in_range(range).await?.len() as u64)
    }

    async fn find_in_range(&self, range: &DateRange) -> MonitorResult<Vec<ResourceSample>> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| range.contains(&row.created_at))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn latest(&self) -> MonitorResult<Option<ResourceSample>> {
        Ok(self.find_in_range(&DateRange::default()).await?.into_iter().next())
    }

    async fn health_check(&self) -> MonitorResult<()> {
        Ok(())
    }
}

/// 写入总是失败的存储
struct UnavailableStore;

#[async_trait]
impl SampleStore for UnavailableStore {
    async fn insert(&self, _sample: &NewResourceSample) -> MonitorResult<ResourceSample> {
        Err(MonitorError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list(
        &self,
        _range: &DateRange,
        _limit: u32,
        _offset: u64,
    ) -> MonitorResult<Vec<ResourceSample>> {
        Ok(Vec::new())
    }

    async fn count(&self, _range: &DateRange) -> MonitorResult<u64> {
        Ok(0)
    }

    async fn find_in_range(&self, _range: &DateRange) -> MonitorResult<Vec<ResourceSample>> {
        Ok(Vec::new())
    }

    async fn latest(&self) -> MonitorResult<Option<ResourceSample>> {
        Ok(None)
    }

    async fn health_check(&self) -> MonitorResult<()> {
        Err(MonitorError::Database(sqlx::Error::PoolTimedOut))
    }
}

fn queue(base_delay_ms: u64) -> Arc<InMemoryWorkQueue> {
    let config = QueueConfig {
        backoff_delay_ms: base_delay_ms,
        ..QueueConfig::default()
    };
    Arc::new(InMemoryWorkQueue::with_config(InMemoryQueueConfig::from(&config)))
}

#[tokio::test]
async fn test_successful_collection_persists_one_sample() {
    let queue = queue(2000);
    let store = Arc::new(MemoryStore::default());
    let worker = CollectionWorker::builder(queue.clone(), Arc::new(FlakySource::new(0)), store.clone())
        .worker_id("test-worker")
        .build();
    let requested_at = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    let id = queue
        .enqueue(
            JobKind::Manual,
            CollectionPayload::at(requested_at),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let claimed = queue.try_dequeue().await.unwrap().unwrap();
    let event = worker.process(claimed).await;

    assert_eq!(
        event,
        WorkerEvent::Completed {
            request_id: id.clone(),
            sample_id: 1
        }
    );
    let rows = store.rows.lock().await;
    assert_eq!(rows.len(), 1);
    let sample = &rows[0];
    assert_eq!(sample.created_at, requested_at);
    assert_eq!(sample.memory_used_mb, 3072);
    assert_eq!(sample.memory_total_mb, 8192);
    // 根分区优先
    assert_eq!(sample.disk_used_mb, 20_480);
    assert_eq!(sample.disk_total_mb, 51_200);
    assert!(sample.memory_used_mb <= sample.memory_total_mb);
    assert!(sample.disk_used_mb <= sample.disk_total_mb);

    let status = queue.find(&id).await.unwrap().unwrap();
    assert_eq!(status.state, RequestState::Completed);
}

#[tokio::test]
async fn test_source_failure_nacks_without_persisting() {
    let queue = queue(2000);
    let store = Arc::new(MemoryStore::default());
    let worker = CollectionWorker::builder(queue.clone(), Arc::new(FlakySource::new(1)), store.clone())
        .build();
    let id = queue
        .enqueue(JobKind::Scheduled, CollectionPayload::default(), EnqueueOptions::default())
        .await
        .unwrap();

    let claimed = queue.try_dequeue().await.unwrap().unwrap();
    match worker.process(claimed).await {
        WorkerEvent::Failed {
            request_id,
            error,
            decision,
        } => {
            assert_eq!(request_id, id);
            assert_eq!(error.name, "MetricsSourceError");
            assert_eq!(
                decision,
                Some(RetryDecision::Retry {
                    attempt: 1,
                    delay: Duration::from_millis(2000)
                })
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(store.rows.lock().await.is_empty());
    let status = queue.find(&id).await.unwrap().unwrap();
    assert_eq!(status.state, RequestState::Delayed);
    assert_eq!(status.request.attempts_made, 1);
}

#[tokio::test]
async fn test_store_failure_nacks_request() {
    let queue = queue(2000);
    let worker = CollectionWorker::builder(
        queue.clone(),
        Arc::new(FlakySource::new(0)),
        Arc::new(UnavailableStore),
    )
    .build();
    let mut events = worker.subscribe();
    let id = queue
        .enqueue(JobKind::Scheduled, CollectionPayload::default(), EnqueueOptions::default())
        .await
        .unwrap();

    let claimed = queue.try_dequeue().await.unwrap().unwrap();
    let event = worker.process(claimed).await;

    match &event {
        WorkerEvent::Failed {
            request_id,
            error,
            decision,
        } => {
            assert_eq!(request_id, &id);
            assert_eq!(error.name, "DatabaseError");
            assert_eq!(
                decision,
                &Some(RetryDecision::Retry {
                    attempt: 1,
                    delay: Duration::from_millis(2000)
                })
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.recv().await.unwrap(), event);

    let status = queue.find(&id).await.unwrap().unwrap();
    assert_eq!(status.state, RequestState::Delayed);
    assert_eq!(status.request.attempts_made, 1);
}

#[tokio::test]
async fn test_lost_lock_after_persist_keeps_sample_without_nack() {
    let queue = queue(2000);
    let store = Arc::new(MemoryStore::default());
    let worker = CollectionWorker::builder(queue.clone(), Arc::new(FlakySource::new(0)), store.clone())
        .build();
    let id = queue
        .enqueue(JobKind::Manual, CollectionPayload::default(), EnqueueOptions::default())
        .await
        .unwrap();

    let mut claimed = queue.try_dequeue().await.unwrap().unwrap();
    claimed.handle.lock_token = "superseded-token".to_string();

    match worker.process(claimed).await {
        WorkerEvent::Failed {
            request_id,
            error,
            decision,
        } => {
            assert_eq!(request_id, id);
            assert_eq!(error.name, "LockLostError");
            assert_eq!(decision, None);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // 样本保留，请求仍由原锁持有，尝试次数未增加
    assert_eq!(store.rows.lock().await.len(), 1);
    let status = queue.find(&id).await.unwrap().unwrap();
    assert_eq!(status.state, RequestState::Active);
    assert_eq!(status.request.attempts_made, 0);
    assert!(status.request.failed_reason.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_retries_until_dead_letter() {
    let queue = queue(100);
    let store = Arc::new(MemoryStore::default());
    let source = Arc::new(FlakySource::new(u32::MAX));
    let worker = Arc::new(
        CollectionWorker::builder(queue.clone(), source.clone(), store.clone()).build(),
    );
    let mut events = worker.subscribe();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let id = queue
        .enqueue(JobKind::Scheduled, CollectionPayload::default(), EnqueueOptions::default())
        .await
        .unwrap();

    let mut decisions = Vec::new();
    for _ in 0..3 {
        match events.recv().await.unwrap() {
            WorkerEvent::Failed { decision, .. } => decisions.push(decision),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(
        decisions,
        vec![
            Some(RetryDecision::Retry { attempt: 1, delay: Duration::from_millis(100) }),
            Some(RetryDecision::Retry { attempt: 2, delay: Duration::from_millis(200) }),
            Some(RetryDecision::DeadLetter { attempts: 3 }),
        ]
    );

    // 死信后不再被领取
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    assert!(store.rows.lock().await.is_empty());
    assert_eq!(
        queue.find(&id).await.unwrap().unwrap().state,
        RequestState::Failed
    );

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let queue = queue(2000);
    let worker = Arc::new(
        CollectionWorker::builder(
            queue.clone(),
            Arc::new(FlakySource::new(0)),
            Arc::new(MemoryStore::default()),
        )
        .build(),
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
