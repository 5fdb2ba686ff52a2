use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use crate::agent::Agent;
use crate::config::DeployConfig;
use crate::runtime::docker::DockerRuntime;

mod agent;
mod cli;
mod config;
mod deploy;
mod port;
mod runtime;
mod signals;
mod webhook;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match DeployConfig::from_args(cli::Args::parse()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match DockerRuntime::connect() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Unable to connect to the container runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    if config.watches_pushes() {
        log::info!(
            "Push notifications for {} will be accepted on port {}",
            config.image,
            port::derive_port(&config.image.to_string())
        );
    }

    match Agent::new(Arc::new(runtime), config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
