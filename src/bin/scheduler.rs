use anyhow::Result;
use clap::Parser;

use resource_status::app::AppMode;
use resource_status::common::{start_application, StartupConfig};

/// 定时触发器，按 CRON 表达式向队列投递采集请求
#[derive(Parser, Debug)]
#[command(name = "resource-status-scheduler", version)]
struct Cli {
    #[command(flatten)]
    startup: StartupConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    start_application(cli.startup, AppMode::Scheduler, "Scheduler").await
}
