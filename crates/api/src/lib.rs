//! # Resource Status API
//!
//! 采样数据的只读查询接口，以及一个手动触发采集的入队接口。
//!
//! ## API 端点
//!
//! - `GET /health` - 队列连接状态与存储连通性（无需密钥）
//! - `GET /api/resource-usage` - 分页查询，支持 `startDate`/`endDate`
//! - `GET /api/resource-usage/history` - 最近 30 天
//! - `GET /api/resource-usage/latest` - 最新一条
//! - `GET /api/resource-usage/stats` - 区间内 CPU/内存/磁盘统计
//! - `POST /api/resource-usage/check` - 入队一个手动采集请求
//!
//! `/api` 下的请求都需要 `x-api-key` 头。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::{middleware::from_fn_with_state, Router};
use resource_status_core::config::ApiConfig;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, request_timeout, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let timeout = Duration::from_secs(api_config.request_timeout_seconds);
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(from_fn_with_state(timeout, request_timeout)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(&api_config.cors_origins))
    } else {
        router
    }
}
