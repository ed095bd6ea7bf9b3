use anyhow::Result;
use clap::Parser;

use resource_status::app::AppMode;
use resource_status::common::{start_application, StartupConfig};

/// 主机资源使用采集与查询服务
#[derive(Parser, Debug)]
#[command(name = "resource-status")]
#[command(version)]
#[command(about = "主机资源使用采集与查询服务")]
struct Cli {
    /// 运行模式
    #[arg(short, long, default_value = "all", value_parser = ["api", "worker", "scheduler", "all"])]
    mode: String,

    #[command(flatten)]
    startup: StartupConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode: AppMode = cli.mode.parse()?;

    start_application(cli.startup, mode, "resource-status").await
}
