use anyhow::Result;
use clap::Parser;

use resource_status::app::AppMode;
use resource_status::common::{start_application, StartupConfig};

/// 采集 Worker，逐个领取队列中的采集请求并写入样本
#[derive(Parser, Debug)]
#[command(name = "resource-status-worker", version)]
struct Cli {
    #[command(flatten)]
    startup: StartupConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    start_application(cli.startup, AppMode::Worker, "Worker").await
}
