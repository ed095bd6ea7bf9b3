use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resource_status_core::{
    CollectionPayload, EnqueueOptions, JobKind, MonitorError, MonitorResult, WorkQueue,
};
use resource_status_infrastructure::{MetricsCollector, StructuredLogger};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cron_utils::CronSchedule;

/// 定时器每次触发时调用
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    /// 不返回错误：处理器自行记录失败，定时器继续运行
    async fn on_trigger(&self, fired_at: DateTime<Utc>);
}

/// 每次触发入队一个定时采集请求
pub struct CollectionTrigger {
    queue: Arc<dyn WorkQueue>,
    options: EnqueueOptions,
    timezone: String,
    metrics: Arc<MetricsCollector>,
}

impl CollectionTrigger {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        options: EnqueueOptions,
        timezone: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            options,
            timezone: timezone.into(),
            metrics,
        }
    }
}

#[async_trait]
impl TriggerHandler for CollectionTrigger {
    async fn on_trigger(&self, fired_at: DateTime<Utc>) {
        match self
            .queue
            .enqueue(
                JobKind::Scheduled,
                CollectionPayload::at(fired_at),
                self.options,
            )
            .await
        {
            Ok(request_id) => {
                self.metrics.record_enqueued();
                StructuredLogger::log_trigger_fired(&self.timezone, fired_at, Some(&request_id));
            }
            Err(e) => {
                StructuredLogger::log_trigger_fired(&self.timezone, fired_at, None);
                StructuredLogger::log_system_error("scheduler", "enqueue", &e);
            }
        }
    }
}

/// 按CRON表达式周期触发的定时器
///
/// 进程停止期间错过的触发不会补发。
pub struct CronTimer {
    schedule: CronSchedule,
    handler: Arc<dyn TriggerHandler>,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CronTimer {
    pub fn new(schedule: CronSchedule, handler: Arc<dyn TriggerHandler>) -> Self {
        Self {
            schedule,
            handler,
            shutdown_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 启动定时器，重复启动返回错误
    pub async fn start(&self) -> MonitorResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(MonitorError::Internal("定时器已在运行".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        info!(
            cron = self.schedule.expression(),
            timezone = %self.schedule.timezone(),
            "启动定时采集"
        );
        *handle = Some(tokio::spawn(run_timer(
            self.schedule.clone(),
            Arc::clone(&self.handler),
            shutdown_rx,
        )));
        Ok(())
    }

    /// 停止定时器，可重复调用
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("定时器任务异常退出: {}", e);
            }
            info!("定时采集已停止");
        }
    }
}

async fn run_timer(
    schedule: CronSchedule,
    handler: Arc<dyn TriggerHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut last_fire: Option<DateTime<Utc>> = None;
    loop {
        let now = Utc::now();
        // 时钟回拨或提前唤醒时不重复触发同一时刻
        let from = last_fire.map_or(now, |last| last.max(now));
        let Some(next) = schedule.next_after(from) else {
            warn!(cron = schedule.expression(), "CRON表达式没有后续触发时间，定时器退出");
            break;
        };
        info!(next_fire = %next, "下一次采集时间");

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                last_fire = Some(next);
                debug!(scheduled_for = %next, "定时器触发");
            }
            _ = shutdown_rx.recv() => {
                debug!("定时器收到停止信号");
                break;
            }
        }

        // 入队可能卡在队列重连里，停止信号到达时放弃这一次触发
        tokio::select! {
            _ = handler.on_trigger(Utc::now()) => {}
            _ = shutdown_rx.recv() => {
                warn!(scheduled_for = %next, "停止时触发仍未完成，已放弃");
                break;
            }
        }
    }
}
