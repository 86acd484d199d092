//! Control-plane interface and mock implementation.
//!
//! The control plane owns the desired state. The agent only reads assignment
//! lists from it and pushes status transitions back; pushes are
//! fire-and-forget and last-write-wins.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use pathfinder_reconcile::{ContainerStatus, StatusPush};
use tracing::debug;

use crate::container::Container;

/// Control-plane interface consumed by the reconcilers.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Containers assigned to `node`, including those scheduled for deletion.
    async fn fetch_containers(&self, node: &str) -> Result<Vec<Container>>;

    /// Containers on `node` waiting for bootstrap.
    async fn fetch_provisioned_containers(&self, node: &str) -> Result<Vec<Container>>;

    async fn update_ipaddress(&self, node: &str, hostname: &str, ipaddress: &str) -> Result<()>;

    async fn mark_provisioned(&self, node: &str, hostname: &str) -> Result<()>;

    async fn mark_deleted(&self, node: &str, hostname: &str) -> Result<()>;

    async fn mark_bootstrap_started(&self, node: &str, hostname: &str) -> Result<()>;

    async fn mark_bootstrapped(&self, node: &str, hostname: &str) -> Result<()>;

    async fn mark_bootstrap_error(&self, node: &str, hostname: &str) -> Result<()>;

    /// Send the call that reports `push`.
    async fn push(&self, node: &str, hostname: &str, push: StatusPush) -> Result<()> {
        match push {
            StatusPush::MarkProvisioned => self.mark_provisioned(node, hostname).await,
            StatusPush::MarkDeleted => self.mark_deleted(node, hostname).await,
            StatusPush::MarkBootstrapStarted => self.mark_bootstrap_started(node, hostname).await,
            StatusPush::MarkBootstrapped => self.mark_bootstrapped(node, hostname).await,
            StatusPush::MarkBootstrapError => self.mark_bootstrap_error(node, hostname).await,
        }
    }
}

/// A call received by [`MockControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    FetchContainers { node: String },
    FetchProvisioned { node: String },
    UpdateIpaddress {
        node: String,
        hostname: String,
        ipaddress: String,
    },
    Mark {
        node: String,
        hostname: String,
        status: ContainerStatus,
    },
}

/// In-memory control plane for testing and development.
///
/// Mark calls update the stored status, so a second pass sees the result of
/// the first. `fetch_containers` leaves out records already `DELETED`;
/// `fetch_provisioned_containers` returns records in `PROVISIONED`.
pub struct MockControlPlane {
    containers: Mutex<BTreeMap<String, Container>>,
    order: Mutex<Vec<String>>,
    calls: Mutex<Vec<ControlPlaneCall>>,
    fail_fetch: bool,
    fail_push: HashSet<String>,
}

impl MockControlPlane {
    /// Create a control plane holding `containers` in the given order.
    pub fn new(containers: Vec<Container>) -> Self {
        let order = containers.iter().map(|c| c.hostname.clone()).collect();
        let containers = containers
            .into_iter()
            .map(|c| (c.hostname.clone(), c))
            .collect();
        Self {
            containers: Mutex::new(containers),
            order: Mutex::new(order),
            calls: Mutex::new(Vec::new()),
            fail_fetch: false,
            fail_push: HashSet::new(),
        }
    }

    /// Fail every fetch.
    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// Fail every push about `hostname`.
    pub fn fail_push_for(mut self, hostname: &str) -> Self {
        self.fail_push.insert(hostname.to_string());
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        lock(&self.calls).clone()
    }

    /// Only the status pushes, as `(hostname, status)`.
    pub fn marks(&self) -> Vec<(String, ContainerStatus)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ControlPlaneCall::Mark {
                    hostname, status, ..
                } => Some((hostname.clone(), *status)),
                _ => None,
            })
            .collect()
    }

    /// Current record for `hostname`.
    pub fn container(&self, hostname: &str) -> Option<Container> {
        lock(&self.containers).get(hostname).cloned()
    }

    fn record(&self, call: ControlPlaneCall) {
        lock(&self.calls).push(call);
    }

    fn snapshot(&self) -> Vec<Container> {
        let containers = lock(&self.containers);
        lock(&self.order)
            .iter()
            .filter_map(|h| containers.get(h).cloned())
            .collect()
    }

    fn mark(&self, node: &str, hostname: &str, status: ContainerStatus) -> Result<()> {
        self.record(ControlPlaneCall::Mark {
            node: node.to_string(),
            hostname: hostname.to_string(),
            status,
        });
        if self.fail_push.contains(hostname) {
            anyhow::bail!("Mock control plane configured to reject pushes for {hostname}");
        }
        debug!(hostname, status = %status, "[MOCK] Status recorded");
        match lock(&self.containers).get_mut(hostname) {
            Some(c) => {
                c.status = Some(status);
                Ok(())
            }
            None => anyhow::bail!("container not found: {hostname}"),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn fetch_containers(&self, node: &str) -> Result<Vec<Container>> {
        self.record(ControlPlaneCall::FetchContainers {
            node: node.to_string(),
        });
        if self.fail_fetch {
            anyhow::bail!("Mock control plane configured to fail fetching");
        }
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|c| c.status != Some(ContainerStatus::Deleted))
            .collect())
    }

    async fn fetch_provisioned_containers(&self, node: &str) -> Result<Vec<Container>> {
        self.record(ControlPlaneCall::FetchProvisioned {
            node: node.to_string(),
        });
        if self.fail_fetch {
            anyhow::bail!("Mock control plane configured to fail fetching");
        }
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|c| c.status == Some(ContainerStatus::Provisioned))
            .collect())
    }

    async fn update_ipaddress(&self, node: &str, hostname: &str, ipaddress: &str) -> Result<()> {
        self.record(ControlPlaneCall::UpdateIpaddress {
            node: node.to_string(),
            hostname: hostname.to_string(),
            ipaddress: ipaddress.to_string(),
        });
        if self.fail_push.contains(hostname) {
            anyhow::bail!("Mock control plane configured to reject pushes for {hostname}");
        }
        if let Some(c) = lock(&self.containers).get_mut(hostname) {
            c.ipaddress = Some(ipaddress.to_string());
        }
        Ok(())
    }

    async fn mark_provisioned(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark(node, hostname, ContainerStatus::Provisioned)
    }

    async fn mark_deleted(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark(node, hostname, ContainerStatus::Deleted)
    }

    async fn mark_bootstrap_started(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark(node, hostname, ContainerStatus::BootstrapStarted)
    }

    async fn mark_bootstrapped(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark(node, hostname, ContainerStatus::Bootstrapped)
    }

    async fn mark_bootstrap_error(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark(node, hostname, ContainerStatus::BootstrapError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_dispatches_to_mark_call() {
        let cp = MockControlPlane::new(vec![Container::scheduled("c1", "16.04")]);

        cp.push("node-01", "c1", StatusPush::MarkProvisioned)
            .await
            .unwrap();

        assert_eq!(
            cp.calls(),
            vec![ControlPlaneCall::Mark {
                node: "node-01".to_string(),
                hostname: "c1".to_string(),
                status: ContainerStatus::Provisioned,
            }]
        );
        assert_eq!(
            cp.container("c1").unwrap().status,
            Some(ContainerStatus::Provisioned)
        );
    }

    #[tokio::test]
    async fn test_fetch_provisioned_filters_by_status() {
        let cp = MockControlPlane::new(vec![
            Container::scheduled("c1", "16.04"),
            Container::scheduled("c2", "16.04").with_status(ContainerStatus::Provisioned),
        ]);

        let pending = cp.fetch_provisioned_containers("node-01").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].hostname, "c2");
    }

    #[tokio::test]
    async fn test_fetch_preserves_order() {
        let cp = MockControlPlane::new(vec![
            Container::scheduled("zeta", "16.04"),
            Container::scheduled("alpha", "16.04"),
        ]);
        let names: Vec<_> = cp
            .fetch_containers("node-01")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.hostname)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }
}
