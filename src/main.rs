mod cli;
mod config;
mod detector;
mod engine;
mod error;
mod models;
mod output;
mod policy;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting deployguard - deployment risk gate");
    cli.execute().await?;

    Ok(())
}
