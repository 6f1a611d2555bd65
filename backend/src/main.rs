use backend::cli::{Cli, Command};
use backend::config::AppConfig;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = AppConfig::from_env()?;

    common::init_logger("macro-tracker", cfg.json_logs);
    tracing::info!("Starting macro tracker...");

    cli.command.unwrap_or(Command::Run).execute(&cfg).await
}
