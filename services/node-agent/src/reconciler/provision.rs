//! Provisioning pass: create what is missing, delete what is unwanted.
//!
//! Runtime calls are made one container at a time. A failing create or
//! delete is logged and counted; it never stops the rest of the pass.

use std::sync::Arc;

use pathfinder_reconcile::{diff_by_hostname, ContainerStatus, LifecycleEvent};
use tracing::{debug, error, info, warn, Instrument};

use super::apply_event;
use crate::container::Container;
use crate::control_plane::ControlPlane;
use crate::error::AgentError;
use crate::runtime::ContainerRuntime;

/// Counts from one provisioning pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub created: usize,
    pub create_failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    /// Containers already present locally that were reported as provisioned.
    pub marked_provisioned: usize,
    /// Desired containers that needed nothing this pass.
    pub unchanged: usize,
}

/// Converges local containers to the control plane's assignment list.
pub struct ProvisionReconciler {
    node_hostname: String,
    runtime: Arc<dyn ContainerRuntime>,
    control_plane: Arc<dyn ControlPlane>,
}

impl ProvisionReconciler {
    pub fn new(
        node_hostname: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            node_hostname: node_hostname.into(),
            runtime,
            control_plane,
        }
    }

    /// Perform a single provisioning pass.
    ///
    /// Fails only when the desired or actual set cannot be fetched.
    pub async fn process(&self) -> Result<ProvisionSummary, AgentError> {
        let desired = self
            .control_plane
            .fetch_containers(&self.node_hostname)
            .await
            .map_err(AgentError::FetchDesired)?;

        let actual = self
            .runtime
            .list_containers()
            .await
            .map_err(AgentError::ListActual)?;

        let diff = diff_by_hostname(
            desired,
            actual.iter().map(|c| c.hostname.as_str()),
            |c| c.hostname.as_str(),
            Container::is_scheduled_for_deletion,
        );
        debug!(
            to_create = diff.to_create.len(),
            present = diff.present.len(),
            to_delete = diff.to_delete.len(),
            absent = diff.absent.len(),
            "Computed container diff"
        );

        let mut summary = ProvisionSummary {
            unchanged: diff.absent.len(),
            ..ProvisionSummary::default()
        };

        for container in &diff.present {
            self.adopt(container, &mut summary)
                .instrument(container.span())
                .await;
        }

        for container in &diff.to_create {
            self.create(container, &mut summary)
                .instrument(container.span())
                .await;
        }

        for container in &diff.to_delete {
            self.delete(container, &mut summary)
                .instrument(container.span())
                .await;
        }

        Ok(summary)
    }

    /// A wanted container already exists locally. Report it if the control
    /// plane still thinks it is only scheduled.
    async fn adopt(&self, container: &Container, summary: &mut ProvisionSummary) {
        let reported = apply_event(
            self.control_plane.as_ref(),
            &self.node_hostname,
            &container.hostname,
            container.status_or_scheduled(),
            LifecycleEvent::Created,
        )
        .await;

        match reported {
            Some(_) => {
                info!("Container already present, marked as provisioned");
                summary.marked_provisioned += 1;
            }
            None => summary.unchanged += 1,
        }
    }

    async fn create(&self, container: &Container, summary: &mut ProvisionSummary) {
        info!(image = %container.image, "Creating container");

        let ipaddress = match self
            .runtime
            .create_container(&container.hostname, &container.image)
            .await
        {
            Ok(ipaddress) => ipaddress,
            Err(e) => {
                error!(error = %e, "Error when creating container");
                summary.create_failed += 1;
                apply_event(
                    self.control_plane.as_ref(),
                    &self.node_hostname,
                    &container.hostname,
                    ContainerStatus::Scheduled,
                    LifecycleEvent::ProvisionFailed,
                )
                .await;
                return;
            }
        };
        summary.created += 1;

        if let Err(e) = self
            .control_plane
            .update_ipaddress(&self.node_hostname, &container.hostname, &ipaddress)
            .await
        {
            warn!(error = %e, ipaddress = %ipaddress, "Failed to report ipaddress");
        }

        // A new container starts from SCHEDULED whatever the record says, so
        // a re-created one goes through bootstrap again.
        let previous = container.status_or_scheduled();
        if previous != ContainerStatus::Scheduled {
            info!(previous = %previous, "Re-created container, resetting status");
        }
        apply_event(
            self.control_plane.as_ref(),
            &self.node_hostname,
            &container.hostname,
            ContainerStatus::Scheduled,
            LifecycleEvent::Created,
        )
        .await;
        info!(ipaddress = %ipaddress, "Container created");
    }

    async fn delete(&self, container: &Container, summary: &mut ProvisionSummary) {
        info!("Deleting container");

        let event = match self.runtime.delete_container(&container.hostname).await {
            Ok(()) => {
                summary.deleted += 1;
                info!("Container deleted");
                LifecycleEvent::DeleteSucceeded
            }
            Err(e) => {
                summary.delete_failed += 1;
                error!(error = %e, "Error when deleting container");
                LifecycleEvent::DeleteFailed
            }
        };

        apply_event(
            self.control_plane.as_ref(),
            &self.node_hostname,
            &container.hostname,
            container.status_or_scheduled(),
            event,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ControlPlaneCall, MockControlPlane};
    use crate::runtime::{MockRuntime, RuntimeCall};

    const NODE: &str = "test-01";

    fn reconciler(
        runtime: &Arc<MockRuntime>,
        cp: &Arc<MockControlPlane>,
    ) -> ProvisionReconciler {
        ProvisionReconciler::new(NODE, runtime.clone(), cp.clone())
    }

    #[tokio::test]
    async fn test_empty_desired_set_is_a_noop() {
        let runtime = Arc::new(MockRuntime::with_containers(["stray"]));
        let cp = Arc::new(MockControlPlane::new(vec![]));

        let summary = reconciler(&runtime, &cp).process().await.unwrap();

        assert_eq!(summary, ProvisionSummary::default());
        assert_eq!(runtime.calls(), vec![RuntimeCall::List]);
        assert_eq!(runtime.hostnames(), vec!["stray"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_runtime() {
        let runtime = Arc::new(MockRuntime::new());
        let cp = Arc::new(
            MockControlPlane::new(vec![Container::scheduled("c1", "16.04")]).failing_fetch(),
        );

        let err = reconciler(&runtime, &cp).process().await.unwrap_err();

        assert!(matches!(err, AgentError::FetchDesired(_)));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_issues_nothing() {
        let runtime = Arc::new(MockRuntime::new().failing_list());
        let cp = Arc::new(MockControlPlane::new(vec![Container::scheduled("c1", "16.04")]));

        let err = reconciler(&runtime, &cp).process().await.unwrap_err();

        assert!(matches!(err, AgentError::ListActual(_)));
        assert!(cp.marks().is_empty());
    }

    #[tokio::test]
    async fn test_ipaddress_reported_before_provisioned() {
        let runtime = Arc::new(MockRuntime::new());
        let cp = Arc::new(MockControlPlane::new(vec![Container::scheduled("c1", "16.04")]));

        reconciler(&runtime, &cp).process().await.unwrap();

        let calls = cp.calls();
        assert_eq!(
            &calls[1..],
            &[
                ControlPlaneCall::UpdateIpaddress {
                    node: NODE.to_string(),
                    hostname: "c1".to_string(),
                    ipaddress: "10.0.0.1".to_string(),
                },
                ControlPlaneCall::Mark {
                    node: NODE.to_string(),
                    hostname: "c1".to_string(),
                    status: ContainerStatus::Provisioned,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_delete_pushes_nothing() {
        let runtime = Arc::new(MockRuntime::with_containers(["c1"]).fail_delete_for("c1"));
        let cp = Arc::new(MockControlPlane::new(vec![
            Container::scheduled("c1", "16.04").with_status(ContainerStatus::ScheduleDeletion),
        ]));

        let summary = reconciler(&runtime, &cp).process().await.unwrap();

        assert_eq!(summary.delete_failed, 1);
        assert!(cp.marks().is_empty());
        assert_eq!(runtime.hostnames(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_push_failure_is_not_fatal() {
        let runtime = Arc::new(MockRuntime::new());
        let cp = Arc::new(
            MockControlPlane::new(vec![
                Container::scheduled("c1", "16.04"),
                Container::scheduled("c2", "16.04"),
            ])
            .fail_push_for("c1"),
        );

        let summary = reconciler(&runtime, &cp).process().await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(
            cp.container("c2").unwrap().status,
            Some(ContainerStatus::Provisioned)
        );
    }

    #[tokio::test]
    async fn test_recreated_container_is_marked_provisioned_again() {
        let runtime = Arc::new(MockRuntime::new());
        let cp = Arc::new(MockControlPlane::new(vec![
            Container::scheduled("c1", "16.04").with_status(ContainerStatus::Bootstrapped),
            Container::scheduled("c2", "16.04").with_status(ContainerStatus::BootstrapError),
        ]));

        let summary = reconciler(&runtime, &cp).process().await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(
            cp.marks(),
            vec![
                ("c1".to_string(), ContainerStatus::Provisioned),
                ("c2".to_string(), ContainerStatus::Provisioned),
            ]
        );
        let pending = cp.fetch_provisioned_containers(NODE).await.unwrap();
        assert_eq!(pending.len(), 2);
    }
}
