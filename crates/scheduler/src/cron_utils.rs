use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use resource_status_core::{config::SchedulerConfig, MonitorError, MonitorResult};

/// 带时区的CRON调度表
///
/// 触发时刻按配置时区的墙上时间匹配，对外统一返回 UTC。
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronSchedule {
    /// 解析CRON表达式和IANA时区名
    pub fn new(cron_expr: &str, timezone: &str) -> MonitorResult<Self> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| MonitorError::InvalidTimezone(timezone.to_string()))?;
        let normalized = normalize_expression(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| MonitorError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expression: cron_expr.trim().to_string(),
            schedule,
            timezone,
        })
    }

    pub fn from_config(config: &SchedulerConfig) -> MonitorResult<Self> {
        Self::new(&config.cron, &config.timezone)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// `from` 之后（不含）的下一次触发时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .next()
            .map(|next| next.with_timezone(&Utc))
    }

    /// 获取从指定时间开始的多个触发时间
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .take(count)
            .map(|next| next.with_timezone(&Utc))
            .collect()
    }
}

/// 把标准 5 段表达式（分 时 日 月 周）转换为带秒字段的形式
///
/// 标准写法的星期 0 和 7 都是周日、1 是周一；`cron` crate 使用 1（周日）到 7（周六），
/// 所以 5 段表达式的数字星期字段需要平移。6/7 段表达式原样返回。
pub fn normalize_expression(cron_expr: &str) -> String {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }

    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        shift_day_of_week(fields[4])
    )
}

fn shift_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let shifted = match range.split_once('-') {
                // 以周日(7)结尾的区间拆成 区间 + 周日
                Some((start, "7")) => match shift_day(start) {
                    Some(start) => format!("{start}-7,1"),
                    None => range.to_string(),
                },
                Some((start, end)) => match (shift_day(start), shift_day(end)) {
                    (Some(start), Some(end)) => format!("{start}-{end}"),
                    _ => range.to_string(),
                },
                None => shift_day(range).unwrap_or_else(|| range.to_string()),
            };
            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn shift_day(day: &str) -> Option<String> {
    match day.parse::<u8>().ok()? {
        0 | 7 => Some("1".to_string()),
        n @ 1..=6 => Some((n + 1).to_string()),
        _ => None,
    }
}
