use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    queue::QueueConfig,
    scheduler_worker::{SchedulerConfig, WorkerConfig},
};

/// 环境变量前缀，例如 `RESOURCE_STATUS_QUEUE__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "RESOURCE_STATUS";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/resource-status.toml",
    "resource-status.toml",
    "/etc/resource-status/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: RESOURCE_STATUS_, nested keys separated by `__`)
    /// 4. Deployment variables (DB_HOST, REDIS_HOST, APP_API_KEY, ...)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.apply_deployment_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 应用部署环境中常见的扁平变量名
    pub fn apply_deployment_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DB_HOST") {
            let port = match lookup("DB_PORT") {
                Some(port) => port
                    .parse::<u16>()
                    .with_context(|| format!("DB_PORT 不是有效端口: {port}"))?,
                None => 3306,
            };
            let user = lookup("DB_USER").unwrap_or_else(|| "root".to_string());
            let password = lookup("DB_PASSWORD");
            let name = lookup("DB_NAME").unwrap_or_else(|| "resource_status".to_string());
            self.database.url =
                DatabaseConfig::mysql_url(&host, port, &user, password.as_deref(), &name);
        }

        if let Some(host) = lookup("REDIS_HOST") {
            self.queue.redis.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            self.queue.redis.port = port
                .parse::<u16>()
                .with_context(|| format!("REDIS_PORT 不是有效端口: {port}"))?;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.queue.redis.password = Some(password);
        }

        if let Some(api_key) = lookup("APP_API_KEY") {
            self.api.api_key = api_key;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(timezone) = lookup("SCHEDULER_TIMEZONE") {
            self.scheduler.timezone = timezone;
        }

        Ok(())
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.queue.validate().context("队列配置验证失败")?;
        self.scheduler
            .validate()
            .context("定时调度配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
