use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use resource_status_core::ConnectionState;
use tracing::warn;

use crate::{response::HealthResponse, routes::AppState};

/// 读取队列计数的最长等待时间，队列客户端在断线时会无限重试
const QUEUE_COUNTS_TIMEOUT: Duration = Duration::from_secs(2);

/// 队列连接状态与存储连通性，不需要API密钥
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = state.queue.connection_state().await;
    let queue_counts = if queue == ConnectionState::Ready {
        match tokio::time::timeout(QUEUE_COUNTS_TIMEOUT, state.queue.counts()).await {
            Ok(Ok(counts)) => Some(counts),
            Ok(Err(e)) => {
                warn!("读取队列计数失败: {}", e);
                None
            }
            Err(_) => {
                warn!("读取队列计数超时");
                None
            }
        }
    } else {
        None
    };
    let store_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!("存储健康检查失败: {}", e);
            false
        }
    };

    // 计数超时说明连接实际不可用
    let healthy = store_ok && queue == ConnectionState::Ready && queue_counts.is_some();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            queue,
            queue_counts,
            store: if store_ok { "ok" } else { "unavailable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
