//! Uniform entry point over the reconcilers, and the timer loop that drives it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::reconciler::{BootstrapReconciler, ProvisionReconciler};

/// Something the scheduler can run on a cadence.
///
/// `run` logs and delegates to one reconciliation pass. It does not retry;
/// being called again on the next tick is the retry.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging.
    fn name(&self) -> &'static str;

    /// Run one pass.
    async fn run(&self);
}

#[async_trait]
impl Agent for ProvisionReconciler {
    fn name(&self) -> &'static str {
        "provision"
    }

    async fn run(&self) {
        info!(agent = self.name(), "Provision agent running");
        match self.process().await {
            Ok(summary) => info!(
                agent = self.name(),
                created = summary.created,
                create_failed = summary.create_failed,
                deleted = summary.deleted,
                delete_failed = summary.delete_failed,
                marked_provisioned = summary.marked_provisioned,
                unchanged = summary.unchanged,
                "Provision pass complete"
            ),
            Err(e) => warn!(
                agent = self.name(),
                reason = e.reason_code(),
                error = %e,
                "Provision pass failed"
            ),
        }
    }
}

#[async_trait]
impl Agent for BootstrapReconciler {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    async fn run(&self) {
        info!(agent = self.name(), "Bootstrap agent running");
        match self.process().await {
            Ok(summary) => info!(
                agent = self.name(),
                launched = summary.launched,
                in_flight = self.pool().in_flight(),
                "Bootstrap pass complete"
            ),
            Err(e) => warn!(
                agent = self.name(),
                reason = e.reason_code(),
                error = %e,
                "Bootstrap pass failed"
            ),
        }
    }
}

/// Run `agent` every `interval` until shutdown.
///
/// The first pass starts immediately. A pass that overruns the interval
/// delays the next tick rather than queueing a burst. Shutdown is checked
/// before each tick; a dropped sender also stops the loop.
pub async fn run_agent_loop(
    agent: Arc<dyn Agent>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        agent = agent.name(),
        interval_secs = interval.as_secs(),
        "Starting agent loop"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(agent = agent.name(), "Agent loop shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                agent.run().await;
            }
        }
    }
}
