use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use resource_status_core::{EnqueueOptions, SampleStore, WorkQueue};
use std::sync::Arc;

use crate::auth::api_key_middleware;
use crate::error::ApiError;
use crate::handlers::{
    health::health_check,
    resource_usage::{
        latest_resource_usage, list_resource_usage, resource_usage_history, resource_usage_stats,
        trigger_resource_usage_check,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SampleStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub api_key: Arc<str>,
    /// 手动采集请求的入队选项
    pub enqueue_options: EnqueueOptions,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SampleStore>,
        queue: Arc<dyn WorkQueue>,
        api_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            store,
            queue,
            api_key: api_key.into(),
            enqueue_options: EnqueueOptions::default(),
        }
    }

    pub fn with_enqueue_options(mut self, options: EnqueueOptions) -> Self {
        self.enqueue_options = options;
        self
    }
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let resource_usage = Router::new()
        .route("/", get(list_resource_usage))
        .route("/history", get(resource_usage_history))
        .route("/latest", get(latest_resource_usage))
        .route("/stats", get(resource_usage_stats))
        .route("/check", post(trigger_resource_usage_check));

    // fallback 也在认证层之内，未知的 /api 路径同样先校验密钥
    let api = Router::new()
        .nest("/resource-usage", resource_usage)
        .fallback(api_not_found)
        .layer(from_fn_with_state(state.clone(), api_key_middleware));

    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state)
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound("Not found")
}
