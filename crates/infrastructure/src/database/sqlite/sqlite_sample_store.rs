use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resource_status_core::{
    DateRange, MonitorError, MonitorResult, NewResourceSample, ResourceSample, SampleStore,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

const SELECT_COLUMNS: &str = "SELECT id, cpu_usage, memory_used_mb, memory_total_mb, \
     disk_used_mb, disk_total_mb, created_at FROM resource_usage";

/// 嵌入式 SQLite 采样存储
///
/// created_at 以 Unix 毫秒整数保存，保证范围比较和排序与时间顺序一致。
pub struct SqliteSampleStore {
    pool: SqlitePool,
}

impl SqliteSampleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> MonitorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resource_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cpu_usage REAL NOT NULL,
                memory_used_mb INTEGER NOT NULL,
                memory_total_mb INTEGER NOT NULL,
                disk_used_mb INTEGER NOT NULL,
                disk_total_mb INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_resource_usage_created_at ON resource_usage (created_at)",
        )
        .execute(&self.pool)
        .await?;
        debug!("resource_usage 表已就绪");
        Ok(())
    }

    fn row_to_sample(row: &SqliteRow) -> MonitorResult<ResourceSample> {
        let created_at_ms: i64 = row.try_get("created_at")?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            MonitorError::Internal(format!("无效的 created_at 时间戳: {created_at_ms}"))
        })?;

        Ok(ResourceSample {
            id: to_unsigned(row.try_get("id")?),
            cpu_usage: row.try_get("cpu_usage")?,
            memory_used_mb: to_unsigned(row.try_get("memory_used_mb")?),
            memory_total_mb: to_unsigned(row.try_get("memory_total_mb")?),
            disk_used_mb: to_unsigned(row.try_get("disk_used_mb")?),
            disk_total_mb: to_unsigned(row.try_get("disk_total_mb")?),
            created_at,
        })
    }

    fn push_range(builder: &mut QueryBuilder<'_, Sqlite>, range: &DateRange) {
        let mut separator = " WHERE ";
        if let Some(start) = range.start {
            builder
                .push(separator)
                .push("created_at >= ")
                .push_bind(start.timestamp_millis());
            separator = " AND ";
        }
        if let Some(end) = range.end {
            builder
                .push(separator)
                .push("created_at <= ")
                .push_bind(end.timestamp_millis());
        }
    }
}

fn to_unsigned(value: i64) -> u64 {
    value.max(0) as u64
}

fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl SampleStore for SqliteSampleStore {
    #[instrument(skip(self, sample), fields(created_at = %sample.created_at))]
    async fn insert(&self, sample: &NewResourceSample) -> MonitorResult<ResourceSample> {
        let result = sqlx::query(
            r#"
            INSERT INTO resource_usage
                (cpu_usage, memory_used_mb, memory_total_mb, disk_used_mb, disk_total_mb, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.cpu_usage)
        .bind(to_signed(sample.memory_used_mb))
        .bind(to_signed(sample.memory_total_mb))
        .bind(to_signed(sample.disk_used_mb))
        .bind(to_signed(sample.disk_total_mb))
        .bind(sample.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let mut stored = sample.clone();
        // 与读取路径保持一致，只保留毫秒精度
        stored.created_at = DateTime::<Utc>::from_timestamp_millis(sample.created_at.timestamp_millis())
            .unwrap_or(sample.created_at);
        Ok(stored.with_id(to_unsigned(result.last_insert_rowid())))
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        range: &DateRange,
        limit: u32,
        offset: u64,
    ) -> MonitorResult<Vec<ResourceSample>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        Self::push_range(&mut builder, range);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(to_signed(offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_sample).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self, range: &DateRange) -> MonitorResult<u64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM resource_usage");
        Self::push_range(&mut builder, range);

        let row = builder.build().fetch_one(&self.pool).await?;
        Ok(to_unsigned(row.try_get("total")?))
    }

    #[instrument(skip(self))]
    async fn find_in_range(&self, range: &DateRange) -> MonitorResult<Vec<ResourceSample>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        Self::push_range(&mut builder, range);
        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_sample).collect()
    }

    async fn latest(&self) -> MonitorResult<Option<ResourceSample>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_sample).transpose()
    }

    async fn health_check(&self) -> MonitorResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
