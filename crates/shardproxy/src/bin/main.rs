use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use common::config::ShardConfig;
use shardproxy::commands::Commands;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl From<LoggingMode> for logutil::LoggingMode {
    fn from(mode: LoggingMode) -> Self {
        match mode {
            LoggingMode::Pretty => logutil::LoggingMode::Pretty,
            LoggingMode::Json => logutil::LoggingMode::Json,
            LoggingMode::Compact => logutil::LoggingMode::Compact,
        }
    }
}

#[derive(Parser)]
#[clap(name = "shardproxy")]
#[clap(version)]
#[clap(about = "Sharding rule and routing tool", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Values can be overridden with
    /// `SHARDPROXY__` prefixed environment variables.
    #[clap(short, long, env = "SHARDPROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Log verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[clap(long, value_enum)]
    log_mode: Option<LoggingMode>,

    #[clap(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logutil::init(cli.verbose, cli.log_mode.unwrap_or_default().into());

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    let config = ShardConfig::load(cli.config.as_deref())?;
    cli.command.run(config)
}
