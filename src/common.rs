use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use resource_status_core::config::{AppConfig, LogFormat};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app::{AppMode, Application};
use crate::shutdown::ShutdownManager;

/// 角色退出的最长等待时间，超过后强制退出进程
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 各个服务二进制共用的启动参数
#[derive(Args, Debug, Clone, Default)]
pub struct StartupConfig {
    /// 配置文件路径，未指定时依次查找默认位置
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short = 'l', long, value_name = "LEVEL",
          value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty"])]
    pub log_format: Option<String>,

    /// Worker ID，覆盖配置文件
    #[arg(long, value_name = "ID")]
    pub worker_id: Option<String>,
}

/// 初始化日志系统，`RUST_LOG` 优先于配置的级别
pub fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// 加载应用配置并应用命令行覆盖
pub fn load_config(startup_config: &StartupConfig) -> Result<AppConfig> {
    let mut config = AppConfig::load(startup_config.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            startup_config.config.as_deref().unwrap_or("<默认位置>")
        )
    })?;

    if let Some(level) = &startup_config.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &startup_config.log_format {
        config.observability.log_format = format.parse()?;
    }
    if let Some(worker_id) = &startup_config.worker_id {
        config.worker.worker_id = Some(worker_id.clone());
    }

    Ok(config)
}

/// 启动应用程序的通用函数
pub async fn start_application(
    startup_config: StartupConfig,
    app_mode: AppMode,
    service_name: &str,
) -> Result<()> {
    let config = load_config(&startup_config)?;
    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    info!("启动 {} 服务", service_name);
    info!("运行模式: {}", app_mode.as_str());

    let app = Arc::new(Application::new(config, app_mode).await?);

    let shutdown_manager = Arc::new(ShutdownManager::default());

    let mut app_handle = {
        let shutdown_manager = Arc::clone(&shutdown_manager);
        let app = Arc::clone(&app);

        tokio::spawn(async move { app.run(&shutdown_manager).await })
    };

    // 角色提前退出（例如端口被占用）时不再等待信号
    let early_exit = tokio::select! {
        _ = wait_for_shutdown_signal() => None,
        result = &mut app_handle => Some(result),
    };

    let result = match early_exit {
        Some(result) => result,
        None => {
            info!("收到关闭信号，开始优雅关闭...");
            shutdown_manager.shutdown();

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, app_handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} 服务关闭超时，强制退出", service_name);
                    return Ok(());
                }
            }
        }
    };

    match result {
        Ok(Ok(())) => {
            info!("{} 服务已优雅关闭", service_name);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("应用运行失败: {:#}", e);
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
    }
}

/// 等待 Ctrl+C 或 SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_command_line_overrides_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite::memory:"

[api]
api_key = "from-file"

[observability]
log_level = "warn"
log_format = "json"
"#
        )
        .unwrap();

        let startup = StartupConfig {
            config: Some(file.path().to_string_lossy().into_owned()),
            log_level: Some("debug".to_string()),
            log_format: Some("pretty".to_string()),
            worker_id: Some("worker-a".to_string()),
        };
        let config = load_config(&startup).unwrap();

        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert_eq!(config.worker.worker_id.as_deref(), Some("worker-a"));
        assert_eq!(config.api.api_key, "from-file");
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let startup = StartupConfig {
            config: Some("/nonexistent/resource-status.toml".to_string()),
            ..Default::default()
        };
        assert!(load_config(&startup).is_err());
    }
}
