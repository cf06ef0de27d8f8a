mod config;
mod data;
mod error;
mod placement;
mod planner;
mod ranking;
mod server;
mod service;
mod state;
mod store;
mod venues;

use clap::Parser;
use config::Config;
use log::{error, info};
use planner::Planner;
use service::SchedulingService;
use std::process::ExitCode;
use std::sync::Arc;
use store::Store;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let store = match Store::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open database {}: {e}", config.database);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Using database {} (lecturer exclusivity {})",
        config.database,
        if config.lecturer_exclusive { "on" } else { "off" }
    );

    let service = SchedulingService::new(Arc::new(store), Planner::new(config.planner_options()));
    if let Err(e) = server::run_server(&config.bind, service).await {
        error!("Server stopped: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
