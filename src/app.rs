use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::{join_all, BoxFuture};
use resource_status_api::{create_app, AppState};
use resource_status_core::{config::AppConfig, SampleStore, WorkQueue};
use resource_status_infrastructure::{
    init_prometheus, DatabaseManager, MetricsCollector, RedisWorkQueue, StructuredLogger,
};
use resource_status_scheduler::{CollectionTrigger, CronSchedule, CronTimer};
use resource_status_worker::{CollectionWorker, SysinfoMetricsSource};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

use crate::shutdown::ShutdownManager;

/// 队列计数指标的刷新间隔
const QUEUE_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行查询 API
    Api,
    /// 仅运行采集 Worker
    Worker,
    /// 仅运行定时触发器
    Scheduler,
    /// 在同一进程中运行所有已启用的角色
    All,
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::Api => "api",
            AppMode::Worker => "worker",
            AppMode::Scheduler => "scheduler",
            AppMode::All => "all",
        }
    }

    fn runs_api(&self, config: &AppConfig) -> bool {
        match self {
            AppMode::Api => true,
            AppMode::All => config.api.enabled,
            _ => false,
        }
    }

    fn runs_worker(&self, config: &AppConfig) -> bool {
        match self {
            AppMode::Worker => true,
            AppMode::All => config.worker.enabled,
            _ => false,
        }
    }

    fn runs_scheduler(&self, config: &AppConfig) -> bool {
        match self {
            AppMode::Scheduler => true,
            AppMode::All => config.scheduler.enabled,
            _ => false,
        }
    }

    /// 单角色模式要求对应角色在配置中启用
    pub fn ensure_enabled(&self, config: &AppConfig) -> Result<()> {
        let enabled = match self {
            AppMode::Api => config.api.enabled,
            AppMode::Worker => config.worker.enabled,
            AppMode::Scheduler => config.scheduler.enabled,
            AppMode::All => true,
        };
        if !enabled {
            return Err(anyhow::anyhow!(
                "{}模式被禁用，请检查配置",
                self.as_str()
            ));
        }
        Ok(())
    }
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(AppMode::Api),
            "worker" => Ok(AppMode::Worker),
            "scheduler" => Ok(AppMode::Scheduler),
            "all" => Ok(AppMode::All),
            other => Err(anyhow::anyhow!("不支持的运行模式: {other}")),
        }
    }
}

/// 主应用程序
///
/// 队列与存储连接在启动时创建一次，再注入各个角色。
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    queue: Arc<dyn WorkQueue>,
    database: Option<DatabaseManager>,
    schedule: Option<CronSchedule>,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {}", mode.as_str());
        mode.ensure_enabled(&config)?;

        if mode.runs_api(&config) {
            config.api.require_api_key()?;
        }

        // 无效的 CRON 或时区在连接任何外部服务之前就终止启动
        let schedule = if mode.runs_scheduler(&config) {
            let schedule =
                CronSchedule::from_config(&config.scheduler).context("解析定时配置失败")?;
            info!(
                cron = %schedule.expression(),
                timezone = %schedule.timezone(),
                "定时配置已加载"
            );
            Some(schedule)
        } else {
            None
        };

        if let Some(address) = &config.observability.metrics_bind_address {
            let addr: SocketAddr = address
                .parse()
                .with_context(|| format!("无效的指标监听地址: {address}"))?;
            init_prometheus(addr)?;
        }

        let database = if mode.runs_api(&config) || mode.runs_worker(&config) {
            Some(create_database(&config).await?)
        } else {
            None
        };

        let queue = create_queue(&config).await?;

        Ok(Self {
            config,
            mode,
            queue,
            database,
            schedule,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// 运行所有角色直到收到关闭信号，然后释放连接
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        info!("启动应用程序，模式: {}", self.mode.as_str());

        let mut roles: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        if self.mode.runs_scheduler(&self.config) {
            roles.push(Box::pin(self.run_scheduler(shutdown.subscribe())));
        }
        if self.mode.runs_worker(&self.config) {
            roles.push(Box::pin(self.run_worker(shutdown.subscribe())));
        }
        if self.mode.runs_api(&self.config) {
            roles.push(Box::pin(self.run_api(shutdown.subscribe())));
        }

        if roles.is_empty() {
            info!("没有启用任何角色");
        }

        let results = shutdown.drain(join_all(roles), self.queue.as_ref()).await;
        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                error!("角色运行失败: {:#}", e);
                first_error.get_or_insert(e);
            }
        }

        self.close().await;

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("所有角色已停止");
                Ok(())
            }
        }
    }

    async fn run_scheduler(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let schedule = self
            .schedule
            .clone()
            .ok_or_else(|| anyhow::anyhow!("定时配置未加载"))?;
        let timezone = schedule.timezone().name().to_string();

        let trigger = CollectionTrigger::new(
            Arc::clone(&self.queue),
            self.config.queue.enqueue_options(),
            timezone,
            Arc::clone(&self.metrics),
        );
        let timer = CronTimer::new(schedule, Arc::new(trigger));
        timer.start().await?;

        let _ = shutdown_rx.recv().await;
        info!("定时触发器收到关闭信号");
        timer.stop().await;

        info!("定时触发器已停止");
        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let store = self.sample_store()?;
        let source = Arc::new(SysinfoMetricsSource::new(self.config.worker.cpu_metric));

        let mut builder = CollectionWorker::builder(Arc::clone(&self.queue), source, store)
            .metrics(Arc::clone(&self.metrics));
        if let Some(worker_id) = &self.config.worker.worker_id {
            builder = builder.worker_id(worker_id.clone());
        }
        let worker = builder.build();
        info!("启动Worker服务: {}", worker.worker_id());

        let stats_handle = {
            let queue = Arc::clone(&self.queue);
            let metrics = Arc::clone(&self.metrics);
            let queue_name = self.config.queue.name.clone();
            let shutdown_rx = shutdown_rx.resubscribe();

            tokio::spawn(async move {
                run_queue_stats_loop(queue, metrics, queue_name, shutdown_rx).await;
            })
        };

        let result = worker.run(shutdown_rx).await;
        let _ = stats_handle.await;

        result.context("Worker运行失败")
    }

    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let api_config = &self.config.api;
        let state = AppState::new(
            self.sample_store()?,
            Arc::clone(&self.queue),
            api_config.require_api_key()?,
        )
        .with_enqueue_options(self.config.queue.enqueue_options());
        let app = create_app(state, api_config);

        let listener = TcpListener::bind(&api_config.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", api_config.bind_address))?;

        info!("API服务器启动在 http://{}", api_config.bind_address);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    fn sample_store(&self) -> Result<Arc<dyn SampleStore>> {
        self.database
            .as_ref()
            .map(DatabaseManager::sample_store)
            .ok_or_else(|| anyhow::anyhow!("数据库未初始化"))
    }

    async fn close(&self) {
        if let Err(e) = self.queue.close().await {
            StructuredLogger::log_system_error("application", "close_queue", &e);
        }
        if let Some(database) = &self.database {
            database.close().await;
        }
    }
}

async fn create_database(config: &AppConfig) -> Result<DatabaseManager> {
    info!("连接数据库: {}", mask_database_url(&config.database.url));

    let database = DatabaseManager::new(&config.database)
        .await
        .context("连接数据库失败")?;
    database.migrate().await.context("创建数据表失败")?;

    info!("数据库连接成功");
    Ok(database)
}

async fn create_queue(config: &AppConfig) -> Result<Arc<dyn WorkQueue>> {
    info!(
        "连接工作队列: {}:{} ({})",
        config.queue.redis.host, config.queue.redis.port, config.queue.name
    );

    let queue = RedisWorkQueue::connect(config.queue.clone())
        .await
        .context("连接工作队列失败")?;

    info!("工作队列连接成功");
    Ok(Arc::new(queue))
}

/// 定期把队列计数写入指标并记录日志
async fn run_queue_stats_loop(
    queue: Arc<dyn WorkQueue>,
    metrics: Arc<MetricsCollector>,
    queue_name: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(QUEUE_STATS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown_rx.recv() => break,
        }

        // 队列断线时 counts() 会一直重试，不能挡住关闭
        tokio::select! {
            result = queue.counts() => match result {
                Ok(counts) => {
                    metrics.update_queue_counts(&counts);
                    StructuredLogger::log_queue_counts(&queue_name, &counts);
                }
                Err(e) => {
                    StructuredLogger::log_system_error("worker", "queue_counts", &e);
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

/// 屏蔽数据库URL中的密码
fn mask_database_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if !url[colon_pos + 1..].starts_with("//") {
                let mut masked = url.to_string();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
    }
    url.to_string()
}
