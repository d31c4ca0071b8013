mod auth;
mod cli;
mod config;
mod error;
mod notified;
mod notify;
mod output;
mod providers;
mod report;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use env_logger::Env;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if !cli.quiet() {
        output::print_banner();
    }

    info!("Starting launchwatch - Optimizely launch monitor");
    cli.execute().await?;

    Ok(())
}
