use trendwatch_backend::cli::{self, Cli};
use trendwatch_backend::config::TrendwatchConfig;
use trendwatch_backend::logging;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TrendwatchConfig::load(&cli.config)?;

    let _logging_guard = logging::init_logging(
        &config.log_dir,
        "trendwatch",
        &config.log_level,
        cli.command.console_floor(),
        config.log_retention_days,
    )?;

    tracing::info!("Trendwatch starting with config {:?}", cli.config);

    cli::run(cli, config).await
}
