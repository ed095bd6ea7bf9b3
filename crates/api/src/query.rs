//! 查询参数解析

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use resource_status_core::DateRange;
use serde::Deserialize;

use crate::error::ApiError;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;
pub const HISTORY_DAYS: u32 = 30;

/// 原始查询参数，数值在处理器中校验以便返回统一的错误格式
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl ListQuery {
    pub fn page_request(&self) -> Result<PageRequest, ApiError> {
        let page = parse_positive("page", self.page.as_deref(), DEFAULT_PAGE)?;
        let limit = parse_positive("limit", self.limit.as_deref(), DEFAULT_LIMIT)?;
        if limit > MAX_LIMIT {
            return Err(ApiError::BadRequest(format!(
                "limit must not exceed {MAX_LIMIT}"
            )));
        }
        Ok(PageRequest { page, limit })
    }

    pub fn date_range(&self) -> Result<DateRange, ApiError> {
        parse_range(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

impl RangeQuery {
    pub fn date_range(&self) -> Result<DateRange, ApiError> {
        parse_range(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

fn parse_positive(name: &str, value: Option<&str>, default: u32) -> Result<u32, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid {name}: {raw}"))),
    }
}

fn parse_range(start: Option<&str>, end: Option<&str>) -> Result<DateRange, ApiError> {
    let start = start.map(|s| parse_date("startDate", s)).transpose()?;
    let end = end.map(|s| parse_date("endDate", s)).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ApiError::BadRequest(
                "startDate must not be after endDate".to_string(),
            ));
        }
    }
    Ok(DateRange::new(start, end))
}

/// `YYYY-MM-DD` 视为当天 UTC 零点，否则按 RFC 3339 解析
pub fn parse_date(name: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("Invalid {name}: {value}")))
}

/// 以 `today` 为结束日的 30 天窗口，按整天对齐
pub fn history_window(today: NaiveDate) -> DateRange {
    let start_day = today
        .checked_sub_days(Days::new(u64::from(HISTORY_DAYS)))
        .unwrap_or(NaiveDate::MIN);
    let start = start_day.and_time(NaiveTime::MIN).and_utc();
    let end = today
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN).and_utc() - chrono::Duration::milliseconds(1))
        .unwrap_or_else(|| today.and_time(NaiveTime::MIN).and_utc());
    DateRange::between(start, end)
}
