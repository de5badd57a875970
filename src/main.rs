//! realstated entry point.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::signal;
use tokio::sync::mpsc;

use realstate::agent::{run_applier, run_reporter, run_router, run_sweeper};
use realstate::config::Config;
use realstate::inspector::DockerInspector;
use realstate::router::LogRouteSink;
use realstate::SafeRealState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting realstated with config: {:?}", cfg);

    // Shared state
    let state = Arc::new(SafeRealState::new());

    // Report channel
    let (report_tx, report_rx) = mpsc::channel(128);

    // Container inspector (Docker)
    let inspector = DockerInspector::connect(cfg.docker_endpoint.as_deref())?;
    let node_ip = cfg.node_ip.clone();
    let report_every = cfg.report_interval();
    let reporter_handle = tokio::spawn(async move {
        if let Err(e) = run_reporter(inspector, node_ip, report_every, report_tx).await {
            error!("Reporter failed: {}", e);
        }
    });

    let applier_handle = tokio::spawn(run_applier(Arc::clone(&state), report_rx));

    // Staleness sweep
    let sweeper_handle = tokio::spawn(run_sweeper(
        Arc::clone(&state),
        cfg.sweep_interval(),
        Duration::from_secs(cfg.container_ttl_secs),
    ));

    // Router sync
    let router_handle = tokio::spawn(run_router(
        Arc::clone(&state),
        LogRouteSink,
        cfg.router_interval(),
    ));

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Abort tasks
    reporter_handle.abort();
    applier_handle.abort();
    sweeper_handle.abort();
    router_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
