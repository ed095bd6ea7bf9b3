use serde::{Deserialize, Serialize};

/// 数据库后端类型，由URL前缀决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    MySql,
    Sqlite,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "mysql://root@localhost:3306/resource_status".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("数据库URL不能为空"));
        }

        if self.backend().is_none() {
            return Err(anyhow::anyhow!("数据库URL必须是MySQL或SQLite格式"));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }

        if self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!("最小连接数不能大于最大连接数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }

    pub fn backend(&self) -> Option<DatabaseBackend> {
        if self.url.starts_with("mysql://") || self.url.starts_with("mariadb://") {
            Some(DatabaseBackend::MySql)
        } else if self.url.starts_with("sqlite:") {
            Some(DatabaseBackend::Sqlite)
        } else {
            None
        }
    }

    /// 由分散的连接参数拼出 MySQL URL
    pub fn mysql_url(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
    ) -> String {
        let auth = match password {
            Some(password) if !password.is_empty() => format!("{user}:{password}"),
            _ => user.to_string(),
        };
        format!("mysql://{auth}@{host}:{port}/{database}")
    }
}
