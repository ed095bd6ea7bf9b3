use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resource_status_core::{
    AckHandle, ClaimedRequest, CollectionPayload, ConnectionState, EnqueueOptions, ErrorRecord,
    JobKind, MonitorError, MonitorResult, QueueCounts, RequestStatus, RetryDecision, WorkQueue,
};
use resource_status_infrastructure::{InMemoryWorkQueue, MetricsCollector};
use resource_status_scheduler::{CollectionTrigger, CronSchedule, CronTimer, TriggerHandler};
use tokio::sync::mpsc;

struct ChannelHandler {
    tx: mpsc::UnboundedSender<DateTime<Utc>>,
}

#[async_trait]
impl TriggerHandler for ChannelHandler {
    async fn on_trigger(&self, fired_at: DateTime<Utc>) {
        let _ = self.tx.send(fired_at);
    }
}

/// 永远不返回的处理器，模拟入队卡在重连中
struct StuckHandler {
    fired: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl TriggerHandler for StuckHandler {
    async fn on_trigger(&self, _fired_at: DateTime<Utc>) {
        let _ = self.fired.send(());
        std::future::pending::<()>().await;
    }
}

/// 入队总是失败的队列
struct UnavailableQueue {
    attempts: AtomicUsize,
}

#[async_trait]
impl WorkQueue for UnavailableQueue {
    async fn enqueue(
        &self,
        _kind: JobKind,
        _payload: CollectionPayload,
        _options: EnqueueOptions,
    ) -> MonitorResult<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(MonitorError::QueueUnavailable("redis down".to_string()))
    }

    async fn try_dequeue(&self) -> MonitorResult<Option<ClaimedRequest>> {
        Ok(None)
    }

    async fn ack(&self, _handle: &AckHandle) -> MonitorResult<()> {
        Ok(())
    }

    async fn nack(&self, _handle: &AckHandle, _error: &ErrorRecord) -> MonitorResult<RetryDecision> {
        Ok(RetryDecision::DeadLetter { attempts: 0 })
    }

    async fn find(&self, _request_id: &str) -> MonitorResult<Option<RequestStatus>> {
        Ok(None)
    }

    async fn counts(&self) -> MonitorResult<QueueCounts> {
        Ok(QueueCounts::default())
    }

    async fn connection_state(&self) -> ConnectionState {
        ConnectionState::Reconnecting
    }

    async fn close(&self) -> MonitorResult<()> {
        Ok(())
    }
}

fn every_second() -> CronSchedule {
    CronSchedule::new("* * * * * *", "Asia/Jakarta").unwrap()
}

#[tokio::test]
async fn test_timer_fires_and_stops() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let timer = CronTimer::new(every_second(), Arc::new(ChannelHandler { tx }));

    timer.start().await.unwrap();
    assert!(timer.is_running().await);
    assert!(timer.start().await.is_err());

    let first = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(second > first);

    timer.stop().await;
    timer.stop().await;
    assert!(!timer.is_running().await);

    // 停止后不再触发
    while rx.try_recv().is_ok() {}
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_collection_trigger_enqueues_scheduled_request() {
    let queue = Arc::new(InMemoryWorkQueue::new());
    let trigger = CollectionTrigger::new(
        queue.clone(),
        EnqueueOptions::default(),
        "Asia/Jakarta",
        Arc::new(MetricsCollector::new()),
    );
    let fired_at = Utc::now();

    trigger.on_trigger(fired_at).await;

    let claimed = queue.try_dequeue().await.unwrap().unwrap();
    assert_eq!(claimed.request.job_kind, JobKind::Scheduled);
    assert_eq!(claimed.request.timestamp, Some(fired_at));
    assert_eq!(claimed.request.priority, 1);
}

#[tokio::test]
async fn test_enqueue_failure_does_not_cancel_timer() {
    let queue = Arc::new(UnavailableQueue {
        attempts: AtomicUsize::new(0),
    });
    let trigger = CollectionTrigger::new(
        queue.clone(),
        EnqueueOptions::default(),
        "UTC",
        Arc::new(MetricsCollector::new()),
    );
    let timer = CronTimer::new(every_second(), Arc::new(trigger));

    timer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(timer.is_running().await);
    assert!(queue.attempts.load(Ordering::SeqCst) >= 2);
    timer.stop().await;
}

#[tokio::test]
async fn test_stop_returns_while_trigger_is_stuck() {
    let (fired, mut fired_rx) = mpsc::unbounded_channel();
    let timer = CronTimer::new(every_second(), Arc::new(StuckHandler { fired }));

    timer.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(3), fired_rx.recv())
        .await
        .unwrap()
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), timer.stop())
        .await
        .expect("stop must not wait for a stuck trigger");
    assert!(!timer.is_running().await);
}
