//! pathfinder Node Agent
//!
//! The node agent runs on each cluster member and converges the containers on
//! this node to the control plane's assignment list.
//!
//! ## Architecture
//!
//! - **Provision loop**: creates missing containers, deletes unwanted ones
//! - **Bootstrap loop**: generates and runs bootstrap scripts with bounded concurrency
//! - **Runtime**: abstracts container lifecycle operations (mock in dev)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pathfinder_agent::config::Config;
use pathfinder_agent::launcher::TokioLauncher;
use pathfinder_agent::{
    run_agent_loop, BootstrapReconciler, ContainerRuntime, ControlPlane, ControlPlaneClient,
    MockRuntime, ProvisionReconciler,
};

/// How long in-flight bootstraps get to finish after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting pathfinder node agent");
    info!(
        node_hostname = %config.node_hostname,
        server_addr = %config.server_addr,
        bootstrap_max_concurrent = config.bootstrap_max_concurrent,
        bootstrap_timeout = ?config.bootstrap_timeout,
        bootstrap_failure_policy = ?config.bootstrap_failure_policy,
        "Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let control_plane: Arc<dyn ControlPlane> = Arc::new(ControlPlaneClient::new(&config)?);

    // Create the runtime (mock for now)
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockRuntime::new());

    let launcher = Arc::new(TokioLauncher::new());

    let provision = Arc::new(ProvisionReconciler::new(
        config.node_hostname.clone(),
        Arc::clone(&runtime),
        Arc::clone(&control_plane),
    ));
    let bootstrap = Arc::new(BootstrapReconciler::from_config(
        &config,
        Arc::clone(&runtime),
        Arc::clone(&control_plane),
        launcher.clone(),
    ));

    let pool = bootstrap.pool().clone();

    let mut loops = JoinSet::new();
    loops.spawn(run_agent_loop(
        provision,
        config.provision_interval,
        shutdown_rx.clone(),
    ));
    loops.spawn(run_agent_loop(
        bootstrap,
        config.bootstrap_interval,
        shutdown_rx.clone(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        Some(result) = loops.join_next() => {
            if let Err(e) = result {
                error!(error = %e, "Agent loop panicked");
            }
        }
    }

    // Signal shutdown to all loops. Closing the pool stops a bootstrap pass
    // that is waiting for a token.
    let _ = shutdown_tx.send(true);
    pool.close();

    // A loop mid-pass finishes that pass first, so join the loops before
    // draining the units they launched.
    info!("Waiting for in-flight bootstraps to finish...");
    let drain = async {
        while loops.join_next().await.is_some() {}
        info!(in_flight = pool.in_flight(), "Agent loops stopped");
        launcher.wait_idle().await;
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        error!("Timed out waiting for in-flight bootstraps");
    }

    info!("Node agent shutdown complete");
    Ok(())
}
