use async_trait::async_trait;
use resource_status_core::{
    DateRange, MonitorResult, NewResourceSample, ResourceSample, SampleStore,
};
use sqlx::{mysql::MySqlRow, MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, instrument};

const SELECT_COLUMNS: &str = "SELECT id, cpu_usage, memory_used_mb, memory_total_mb, \
     disk_used_mb, disk_total_mb, created_at FROM resource_usage";

/// MySQL 采样存储，对应 resource_usage 表
pub struct MySqlSampleStore {
    pool: MySqlPool,
}

impl MySqlSampleStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> MonitorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resource_usage (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                cpu_usage DOUBLE NOT NULL,
                memory_used_mb BIGINT UNSIGNED NOT NULL,
                memory_total_mb BIGINT UNSIGNED NOT NULL,
                disk_used_mb BIGINT UNSIGNED NOT NULL,
                disk_total_mb BIGINT UNSIGNED NOT NULL,
                created_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
                INDEX idx_resource_usage_created_at (created_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        debug!("resource_usage 表已就绪");
        Ok(())
    }

    fn row_to_sample(row: &MySqlRow) -> MonitorResult<ResourceSample> {
        Ok(ResourceSample {
            id: row.try_get("id")?,
            cpu_usage: row.try_get("cpu_usage")?,
            memory_used_mb: row.try_get("memory_used_mb")?,
            memory_total_mb: row.try_get("memory_total_mb")?,
            disk_used_mb: row.try_get("disk_used_mb")?,
            disk_total_mb: row.try_get("disk_total_mb")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn push_range(builder: &mut QueryBuilder<'_, MySql>, range: &DateRange) {
        let mut separator = " WHERE ";
        if let Some(start) = range.start {
            builder.push(separator).push("created_at >= ").push_bind(start);
            separator = " AND ";
        }
        if let Some(end) = range.end {
            builder.push(separator).push("created_at <= ").push_bind(end);
        }
    }
}

#[async_trait]
impl SampleStore for MySqlSampleStore {
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
        .bind(sample.memory_used_mb)
        .bind(sample.memory_total_mb)
        .bind(sample.disk_used_mb)
        .bind(sample.disk_total_mb)
        .bind(sample.created_at)
        .execute(&self.pool)
        .await?;

        Ok(sample.clone().with_id(result.last_insert_id()))
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        range: &DateRange,
        limit: u32,
        offset: u64,
    ) -> MonitorResult<Vec<ResourceSample>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
        Self::push_range(&mut builder, range);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_sample).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self, range: &DateRange) -> MonitorResult<u64> {
        let mut builder = QueryBuilder::<MySql>::new("SELECT COUNT(*) AS total FROM resource_usage");
        Self::push_range(&mut builder, range);

        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn find_in_range(&self, range: &DateRange) -> MonitorResult<Vec<ResourceSample>> {
        let mut builder = QueryBuilder::<MySql>::new(SELECT_COLUMNS);
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
