mod catalog;
mod config;
mod data;
mod error;
mod generator;
mod ledger;
mod rooms;
mod rotation;
mod server;
mod solver;
mod store;

use clap::Parser;
use config::{Args, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from(Args::parse());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter.as_str())).init();

    let scheduler = solver::Scheduler::from_config(&config)?;

    server::run_server(&config, scheduler).await?;

    Ok(())
}
