use anyhow::Result;
use clap::Parser;

use resource_status::app::AppMode;
use resource_status::common::{start_application, StartupConfig};

/// 资源使用查询 API，提供 `/api/resource-usage` 下的只读接口与手动采集入口
#[derive(Parser, Debug)]
#[command(name = "resource-status-api", version)]
struct Cli {
    #[command(flatten)]
    startup: StartupConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    start_application(cli.startup, AppMode::Api, "API Server").await
}
