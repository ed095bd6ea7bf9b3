use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use resource_status_core::WorkQueue;
use resource_status_infrastructure::StructuredLogger;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 角色收到关闭信号后的默认宽限期
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 进程关闭顺序
///
/// 1. `shutdown()` 向所有角色广播信号，Worker 会先处理完手上的请求。
/// 2. `drain()` 等待各角色退出。宽限期内仍未退出时提前关闭队列，
///    让卡在重连循环里的队列调用返回错误。
/// 3. 角色全部退出后由调用方释放队列与数据库连接。
pub struct ShutdownManager {
    signal: Mutex<Option<broadcast::Sender<()>>>,
    drain_timeout: Duration,
}

impl ShutdownManager {
    pub fn new(drain_timeout: Duration) -> Self {
        let (signal, _) = broadcast::channel(1);
        Self {
            signal: Mutex::new(Some(signal)),
            drain_timeout,
        }
    }

    /// 订阅关闭信号；已经关闭时返回的接收器立即结束
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let guard = self.signal.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(signal) => signal.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// 广播关闭信号，重复调用无效果
    pub fn shutdown(&self) {
        let signal = self
            .signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match signal {
            Some(signal) => {
                debug!("发送关闭信号给 {} 个订阅者", signal.receiver_count());
                let _ = signal.send(());
                info!("关闭信号已发送");
            }
            None => debug!("关闭信号已经发送过"),
        }
    }

    /// 运行各角色直到全部退出
    ///
    /// 关闭信号发出后超过宽限期仍有角色未退出时关闭队列。
    pub async fn drain<F>(&self, roles: F, queue: &dyn WorkQueue) -> F::Output
    where
        F: Future,
    {
        let mut signal = self.subscribe();
        tokio::pin!(roles);

        tokio::select! {
            output = &mut roles => return output,
            _ = signal.recv() => {}
        }

        match tokio::time::timeout(self.drain_timeout, &mut roles).await {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "角色未在宽限期内退出，提前关闭工作队列"
                );
                if let Err(e) = queue.close().await {
                    StructuredLogger::log_system_error("shutdown", "close_queue", &e);
                }
                roles.await
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_status_core::ConnectionState;
    use resource_status_infrastructure::InMemoryWorkQueue;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_every_role_receives_signal() {
        let manager = ShutdownManager::default();
        let mut scheduler_rx = manager.subscribe();
        let mut worker_rx = manager.subscribe();
        let mut api_rx = manager.subscribe();

        manager.shutdown();
        manager.shutdown();

        for rx in [&mut scheduler_rx, &mut worker_rx, &mut api_rx] {
            let result = timeout(Duration::from_millis(100), rx.recv()).await;
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_returns_immediately() {
        let manager = ShutdownManager::default();
        manager.shutdown();

        let mut rx = manager.subscribe();
        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drain_keeps_queue_open_when_roles_exit_in_time() {
        let manager = Arc::new(ShutdownManager::new(Duration::from_secs(5)));
        let queue = InMemoryWorkQueue::new();
        let mut role_rx = manager.subscribe();
        let role = async move {
            let _ = role_rx.recv().await;
            "stopped"
        };

        let trigger = Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.shutdown();
        });

        let output = timeout(Duration::from_secs(1), manager.drain(role, &queue))
            .await
            .unwrap();
        assert_eq!(output, "stopped");
        assert_eq!(queue.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_drain_closes_queue_to_release_blocked_role() {
        let manager = Arc::new(ShutdownManager::new(Duration::from_millis(50)));
        let queue = Arc::new(InMemoryWorkQueue::new());
        // 空队列上的 dequeue 只会因关闭而返回
        let role = {
            let queue = Arc::clone(&queue);
            async move { queue.dequeue().await }
        };

        let trigger = Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.shutdown();
        });

        let output = timeout(Duration::from_secs(1), manager.drain(role, queue.as_ref()))
            .await
            .unwrap();
        assert!(output.is_err());
        assert_eq!(queue.connection_state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_drain_returns_role_output_without_signal() {
        let manager = ShutdownManager::default();
        let queue = InMemoryWorkQueue::new();

        let output = manager.drain(async { 7 }, &queue).await;
        assert_eq!(output, 7);
    }
}
