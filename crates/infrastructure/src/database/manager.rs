use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use resource_status_core::{
    config::{DatabaseBackend, DatabaseConfig},
    MonitorError, MonitorResult, SampleStore,
};
use sqlx::sqlite::SqliteConnectOptions;
use tracing::info;

use super::mysql::MySqlSampleStore;
use super::sqlite::SqliteSampleStore;

/// Database connection pool enum
#[derive(Debug, Clone)]
pub enum DatabasePool {
    MySql(sqlx::MySqlPool),
    Sqlite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// Create pool from configuration with automatic type detection
    pub async fn new(config: &DatabaseConfig) -> MonitorResult<Self> {
        let backend = config.backend().ok_or_else(|| {
            MonitorError::Configuration(format!("不支持的数据库URL: {}", config.url))
        })?;
        let acquire_timeout = Duration::from_secs(config.connection_timeout_seconds);
        let idle_timeout = Duration::from_secs(config.idle_timeout_seconds);

        match backend {
            DatabaseBackend::MySql => {
                let pool = sqlx::mysql::MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::MySql(pool))
            }
            DatabaseBackend::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
                // 内存数据库每个连接是独立的库，只能使用单连接且不能回收
                let pool = if config.url.contains(":memory:") {
                    sqlx::sqlite::SqlitePoolOptions::new()
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                        .connect_with(options)
                        .await?
                } else {
                    sqlx::sqlite::SqlitePoolOptions::new()
                        .max_connections(config.max_connections)
                        .acquire_timeout(acquire_timeout)
                        .idle_timeout(idle_timeout)
                        .connect_with(options)
                        .await?
                };
                Ok(DatabasePool::Sqlite(pool))
            }
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            DatabasePool::MySql(_) => DatabaseBackend::MySql,
            DatabasePool::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::MySql(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// 数据库管理器，负责建表和创建采样存储
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> MonitorResult<Self> {
        let pool = DatabasePool::new(config).await?;
        info!(backend = ?pool.backend(), "数据库连接池已创建");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.pool.backend()
    }

    /// 创建 resource_usage 表（已存在时跳过）
    pub async fn migrate(&self) -> MonitorResult<()> {
        match &self.pool {
            DatabasePool::MySql(pool) => MySqlSampleStore::new(pool.clone()).migrate().await,
            DatabasePool::Sqlite(pool) => SqliteSampleStore::new(pool.clone()).migrate().await,
        }
    }

    pub fn sample_store(&self) -> Arc<dyn SampleStore> {
        match &self.pool {
            DatabasePool::MySql(pool) => Arc::new(MySqlSampleStore::new(pool.clone())),
            DatabasePool::Sqlite(pool) => Arc::new(SqliteSampleStore::new(pool.clone())),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}
