use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use resource_status_core::{CollectionPayload, DateRange, JobKind, UsageStats};
use tracing::{info, instrument};

use crate::{
    error::{ApiError, ApiResult},
    query::{history_window, ListQuery, RangeQuery, HISTORY_DAYS},
    response::{
        CheckResponse, DataResponse, HistoryMeta, HistoryResponse, LatestResponse, ListResponse,
        Pagination, StatsResponse,
    },
    routes::AppState,
};

/// 分页列表，最新在前
#[instrument(skip_all)]
pub async fn list_resource_usage(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let page = query.page_request()?;
    let range = query.date_range()?;

    let fetch_failed = |e| ApiError::internal("Failed to fetch resource usage data", e);
    let data = state
        .store
        .list(&range, page.limit, page.offset())
        .await
        .map_err(fetch_failed)?;
    let total = state.store.count(&range).await.map_err(fetch_failed)?;

    Ok(Json(ListResponse {
        success: true,
        data,
        pagination: Pagination::new(page.page, page.limit, total),
    }))
}

/// 最近 30 天（按整天对齐）
#[instrument(skip_all)]
pub async fn resource_usage_history(
    State(state): State<AppState>,
) -> ApiResult<Json<HistoryResponse>> {
    let window = history_window(Utc::now().date_naive());
    let data = state
        .store
        .find_in_range(&window)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch resource usage history", e))?;

    let format = |at: Option<chrono::DateTime<Utc>>| {
        at.map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    };
    let meta = HistoryMeta {
        days: HISTORY_DAYS,
        start_date: format(window.start),
        end_date: format(window.end),
        total_records: data.len(),
    };

    Ok(Json(HistoryResponse {
        success: true,
        data,
        meta,
    }))
}

#[instrument(skip_all)]
pub async fn latest_resource_usage(
    State(state): State<AppState>,
) -> ApiResult<Json<LatestResponse>> {
    let latest = state
        .store
        .latest()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch latest resource usage data", e))?;

    latest
        .map(|sample| Json(DataResponse::new(sample)))
        .ok_or(ApiError::NotFound("No resource usage data found"))
}

#[instrument(skip_all)]
pub async fn resource_usage_stats(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let range: DateRange = query.date_range()?;
    let samples = state
        .store
        .find_in_range(&range)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch resource usage statistics", e))?;

    UsageStats::from_samples(&samples)
        .map(|stats| Json(DataResponse::new(stats)))
        .ok_or(ApiError::NotFound("No data found for the specified period"))
}

/// 手动触发一次采集，与定时任务共用入队路径
#[instrument(skip_all)]
pub async fn trigger_resource_usage_check(
    State(state): State<AppState>,
) -> ApiResult<Json<CheckResponse>> {
    let job_id = state
        .queue
        .enqueue(
            JobKind::Manual,
            CollectionPayload::at(Utc::now()),
            state.enqueue_options,
        )
        .await
        .map_err(|e| ApiError::internal("Failed to trigger resource usage check", e))?;

    info!(request.id = %job_id, "Resource usage check job added");
    Ok(Json(CheckResponse {
        success: true,
        message: "Resource usage check job added to queue".to_string(),
        job_id,
    }))
}
