//! Endpoint Sync Controller
//!
//! Synchronizes externally discovered endpoints (OpenStack compute
//! instances) into exactly one managed Kubernetes Endpoints object:
//! - Discovers instances through a pluggable provider interface
//! - Selects and groups them with configurable regex rules
//! - Writes the result with optimistic concurrency and bounded retry
//!
//! Services without a pod selector can thereby route to addresses that
//! live outside the cluster.

mod config;
mod controller;
mod discovery;
mod error;
mod reconciler;
mod rules;
mod scheduler;
mod target;
#[cfg(test)]
mod test_utils;
mod translate;
mod watcher;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting Endpoint Sync Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Provider: {:?}", config.provider);
    info!("  Target: {}/{}", config.namespace, config.endpoint_name);
    info!("  Sync period: {:?}", config.sync_period);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
