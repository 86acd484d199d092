//! Bootstrap pass: generate scripts in sequence, execute them concurrently.
//!
//! Script generation runs on the pass itself and must succeed before a
//! container is launched. Execution runs as an independent unit through the
//! [`Launcher`], holding one token from the [`TokenPool`]. Acquiring the token
//! is where the pass waits when too many containers are already bootstrapping.

use std::sync::Arc;
use std::time::Duration;

use pathfinder_reconcile::{ContainerStatus, LifecycleEvent};
use tracing::{error, info, warn, Instrument};

use super::apply_event;
use crate::config::Config;
use crate::container::Container;
use crate::control_plane::ControlPlane;
use crate::error::AgentError;
use crate::launcher::Launcher;
use crate::pool::{Token, TokenPool};
use crate::runtime::ContainerRuntime;

/// What a pass does after a container fails script generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapFailurePolicy {
    /// Stop the pass at the first failure.
    FailFast,
    /// Skip the failed container and continue with the rest of the batch.
    #[default]
    Isolate,
}

/// Counts from one bootstrap pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapSummary {
    /// Units handed to the launcher.
    pub launched: usize,
}

/// Generates and launches container bootstraps.
pub struct BootstrapReconciler {
    node_hostname: String,
    runtime: Arc<dyn ContainerRuntime>,
    control_plane: Arc<dyn ControlPlane>,
    pool: TokenPool,
    launcher: Arc<dyn Launcher>,
    timeout: Option<Duration>,
    failure_policy: BootstrapFailurePolicy,
}

impl BootstrapReconciler {
    pub fn new(
        node_hostname: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
        control_plane: Arc<dyn ControlPlane>,
        pool: TokenPool,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            node_hostname: node_hostname.into(),
            runtime,
            control_plane,
            pool,
            launcher,
            timeout: None,
            failure_policy: BootstrapFailurePolicy::default(),
        }
    }

    /// Build a reconciler with the pool size, deadline and policy from `config`.
    pub fn from_config(
        config: &Config,
        runtime: Arc<dyn ContainerRuntime>,
        control_plane: Arc<dyn ControlPlane>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self::new(
            config.node_hostname.clone(),
            runtime,
            control_plane,
            TokenPool::new(config.bootstrap_max_concurrent),
            launcher,
        )
        .with_timeout(config.bootstrap_timeout)
        .with_failure_policy(config.bootstrap_failure_policy)
    }

    /// Deadline for each bootstrap execution.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_policy(mut self, policy: BootstrapFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn pool(&self) -> &TokenPool {
        &self.pool
    }

    /// Perform a single bootstrap pass.
    ///
    /// Returns once every container has been prepared and launched; launched
    /// units report their outcome on their own.
    pub async fn process(&self) -> Result<BootstrapSummary, AgentError> {
        let containers = self
            .control_plane
            .fetch_provisioned_containers(&self.node_hostname)
            .await
            .map_err(AgentError::FetchProvisioned)?;

        let mut summary = BootstrapSummary::default();
        let mut failed = Vec::new();

        for container in containers {
            if self.pool.is_closed() {
                return Err(AgentError::PoolClosed);
            }
            let span = container.span();

            if let Err(e) = self.prepare(&container).instrument(span.clone()).await {
                match self.failure_policy {
                    BootstrapFailurePolicy::FailFast => return Err(e),
                    BootstrapFailurePolicy::Isolate => {
                        failed.push(container.hostname);
                        continue;
                    }
                }
            }

            let token = match self.pool.acquire().await {
                Ok(token) => token,
                Err(e) => {
                    // Already reported as started; it will not run now.
                    warn!(hostname = %container.hostname, "Token pool closed before launch");
                    apply_event(
                        self.control_plane.as_ref(),
                        &self.node_hostname,
                        &container.hostname,
                        ContainerStatus::BootstrapStarted,
                        LifecycleEvent::BootstrapFailed,
                    )
                    .await;
                    return Err(e);
                }
            };
            let unit = run_bootstrap(
                Arc::clone(&self.runtime),
                Arc::clone(&self.control_plane),
                self.node_hostname.clone(),
                container,
                self.timeout,
                token,
            )
            .instrument(span);

            self.launcher.launch(Box::pin(unit));
            summary.launched += 1;
        }

        if !failed.is_empty() {
            warn!(
                launched = summary.launched,
                failed = failed.len(),
                "Bootstrap pass finished with script failures"
            );
            return Err(AgentError::BootstrapBatch { failed });
        }

        Ok(summary)
    }

    /// Generate the bootstrap script and report the start of bootstrap.
    async fn prepare(&self, container: &Container) -> Result<(), AgentError> {
        info!("Creating container bootstrap script");

        if container.bootstrappers.is_empty() {
            self.report(container, LifecycleEvent::ScriptFailed).await;
            error!("Bootstrappers not specified");
            return Err(AgentError::MissingBootstrappers {
                hostname: container.hostname.clone(),
            });
        }

        if let Err(e) = self
            .runtime
            .create_container_bootstrap_script(container)
            .await
        {
            self.report(container, LifecycleEvent::ScriptFailed).await;
            error!(error = %e, "Error when creating container bootstrap script");
            return Err(AgentError::BootstrapScript {
                hostname: container.hostname.clone(),
                source: e,
            });
        }

        self.report(container, LifecycleEvent::ScriptReady).await;
        Ok(())
    }

    async fn report(&self, container: &Container, event: LifecycleEvent) {
        // Everything fetched here is awaiting bootstrap, whatever stale
        // status the record carries.
        apply_event(
            self.control_plane.as_ref(),
            &self.node_hostname,
            &container.hostname,
            ContainerStatus::Provisioned,
            event,
        )
        .await;
    }
}

/// One bootstrap execution. `_token` is released when this future ends or is
/// dropped.
async fn run_bootstrap(
    runtime: Arc<dyn ContainerRuntime>,
    control_plane: Arc<dyn ControlPlane>,
    node_hostname: String,
    container: Container,
    timeout: Option<Duration>,
    _token: Token,
) {
    info!("Bootstrapping container");
    apply_event(
        control_plane.as_ref(),
        &node_hostname,
        &container.hostname,
        ContainerStatus::BootstrapStarted,
        LifecycleEvent::BootstrapStarted,
    )
    .await;

    let execution = runtime.validate_and_bootstrap_container(&container);
    let result = match timeout {
        Some(deadline) => match tokio::time::timeout(deadline, execution).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "bootstrap did not finish within {}s",
                deadline.as_secs_f64()
            )),
        },
        None => execution.await,
    };

    let event = match result {
        Ok(()) => {
            info!("Container bootstrapped");
            LifecycleEvent::BootstrapSucceeded
        }
        Err(e) => {
            error!(error = %e, "Error when bootstrapping container");
            LifecycleEvent::BootstrapFailed
        }
    };

    apply_event(
        control_plane.as_ref(),
        &node_hostname,
        &container.hostname,
        ContainerStatus::BootstrapStarted,
        event,
    )
    .await;
}
