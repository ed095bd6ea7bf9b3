use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use reqwest::Client;
use resource_status_core::{
    config::AppConfig, CollectionPayload, JobKind, MetricsSource, RequestStatus, WorkQueue,
};
use resource_status_infrastructure::RedisWorkQueue;
use resource_status_worker::{normalize, select_filesystem, SysinfoMetricsSource};
use serde_json::Value;

/// CLI应用程序主结构
#[derive(Parser, Debug)]
#[command(name = "resource-status-cli")]
#[command(version)]
#[command(about = "主机资源使用采集服务 - 命令行管理工具")]
struct CliApp {
    #[command(subcommand)]
    command: Commands,

    /// API服务器基础URL
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    api_url: String,

    /// API认证密钥，未指定时使用配置中的密钥
    #[arg(long)]
    api_key: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 通过 API 触发一次手动采集
    Check,
    /// 直接向队列投递一个手动采集请求
    Enqueue {
        /// 等待请求进入终态并打印结果
        #[arg(short, long)]
        wait: bool,
        /// 最长等待时间（秒）
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },
    /// 读取一次本机指标并打印原始值与换算结果
    Probe,
    /// 打印队列计数与连接状态
    Queue,
    /// 打印生效的配置（TOML）
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = CliApp::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;

    match cli.command {
        Commands::Check => {
            let api_key = cli.api_key.unwrap_or_else(|| config.api.api_key.clone());
            handle_check(&cli.api_url, &api_key).await
        }
        Commands::Enqueue { wait, timeout } => {
            handle_enqueue(&config, wait, Duration::from_secs(timeout)).await
        }
        Commands::Probe => handle_probe(&config).await,
        Commands::Queue => handle_queue(&config).await,
        Commands::Config => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn handle_check(api_url: &str, api_key: &str) -> Result<()> {
    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("创建HTTP客户端失败")?;

    let response = client
        .post(format!("{}/api/resource-usage/check", api_url.trim_end_matches('/')))
        .header("x-api-key", api_key)
        .send()
        .await
        .context("发送采集请求失败")?;

    let status = response.status();
    let body: Value = response.json().await.context("解析响应失败")?;
    if status.is_success() {
        println!("{}", body["message"].as_str().unwrap_or("OK"));
        println!("请求ID: {}", body["jobId"].as_str().unwrap_or("N/A"));
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "触发采集失败 ({}): {}",
            status,
            body["error"].as_str().unwrap_or("未知错误")
        ))
    }
}

async fn handle_enqueue(config: &AppConfig, wait: bool, timeout: Duration) -> Result<()> {
    let queue = RedisWorkQueue::connect(config.queue.clone())
        .await
        .context("连接工作队列失败")?;

    let request_id = queue
        .enqueue(
            JobKind::Manual,
            CollectionPayload::at(Utc::now()),
            config.queue.enqueue_options(),
        )
        .await?;
    println!("已入队: {request_id}");

    if wait {
        let status = tokio::time::timeout(timeout, wait_for_terminal(&queue, &request_id))
            .await
            .map_err(|_| anyhow::anyhow!("等待请求完成超时: {request_id}"))??;
        print_request_status(&status);
    }

    queue.close().await?;
    Ok(())
}

async fn wait_for_terminal(queue: &RedisWorkQueue, request_id: &str) -> Result<RequestStatus> {
    loop {
        match queue.find(request_id).await? {
            Some(status) if status.state.is_terminal() => return Ok(status),
            Some(_) => {}
            None => return Err(anyhow::anyhow!("请求已不在队列中: {request_id}")),
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn handle_probe(config: &AppConfig) -> Result<()> {
    let source = SysinfoMetricsSource::new(config.worker.cpu_metric);
    let raw = source.read().await?;

    println!("原始读数 ({}):", source.name());
    println!("  CPU: {:.2}", raw.cpu_load);
    println!(
        "  内存: {} / {} 字节",
        raw.memory_used_bytes, raw.memory_total_bytes
    );
    for fs in &raw.filesystems {
        println!("  {}: {} / {} 字节", fs.mount, fs.used_bytes, fs.size_bytes);
    }
    if let Some(fs) = select_filesystem(&raw.filesystems) {
        println!("  选用挂载点: {}", fs.mount);
    }

    let sample = normalize(&raw, Utc::now())?;
    println!("换算结果:");
    println!("  cpu_usage: {:.2}", sample.cpu_usage);
    println!(
        "  memory: {} / {} MB",
        sample.memory_used_mb, sample.memory_total_mb
    );
    println!("  disk: {} / {} MB", sample.disk_used_mb, sample.disk_total_mb);
    Ok(())
}

async fn handle_queue(config: &AppConfig) -> Result<()> {
    let queue = RedisWorkQueue::connect(config.queue.clone())
        .await
        .context("连接工作队列失败")?;

    let counts = queue.counts().await?;
    println!("队列: {}", config.queue.name);
    println!("  连接状态: {}", queue.connection_state().await);
    println!("  waiting:   {}", counts.waiting);
    println!("  delayed:   {}", counts.delayed);
    println!("  active:    {}", counts.active);
    println!("  completed: {}", counts.completed);
    println!("  failed:    {}", counts.failed);

    queue.close().await?;
    Ok(())
}

fn print_request_status(status: &RequestStatus) {
    let request = &status.request;
    println!("请求 {} 状态: {}", request.id, status.state);
    println!("  类型: {}", request.job_kind);
    println!(
        "  尝试次数: {}/{}",
        request.attempts_made, request.max_attempts
    );
    if let Some(reason) = &request.failed_reason {
        println!("  失败原因: {reason}");
    }
}
