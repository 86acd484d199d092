//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts the local container engine:
//! - Listing, creating and deleting containers
//! - Generating and executing a container's bootstrap script
//!
//! A mock implementation is provided for testing and development.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::container::Container;

/// Local container runtime interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers present on this node.
    async fn list_containers(&self) -> Result<Vec<Container>>;

    /// Create and start a container, returning its ipaddress.
    async fn create_container(&self, hostname: &str, image: &str) -> Result<String>;

    /// Remove a container.
    async fn delete_container(&self, hostname: &str) -> Result<()>;

    /// Materialize the bootstrap script for a container.
    async fn create_container_bootstrap_script(&self, container: &Container) -> Result<()>;

    /// Validate the generated script and run it inside the container.
    async fn validate_and_bootstrap_container(&self, container: &Container) -> Result<()>;
}

/// A call received by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    List,
    Create { hostname: String, image: String },
    Delete { hostname: String },
    BootstrapScript { hostname: String },
    Bootstrap { hostname: String },
}

/// Mock runtime for testing and development.
///
/// Keeps an in-memory container table and hands out addresses from
/// `10.0.0.0/8` in order.
pub struct MockRuntime {
    containers: Mutex<BTreeMap<String, Container>>,
    calls: Mutex<Vec<RuntimeCall>>,
    ip_counter: AtomicU32,

    fail_list: bool,
    fail_create: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_script: HashSet<String>,
    fail_bootstrap: HashSet<String>,
    hang_bootstrap: HashSet<String>,

    /// Simulated bootstrap duration.
    bootstrap_delay: Duration,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            ip_counter: AtomicU32::new(0),
            fail_list: false,
            fail_create: HashSet::new(),
            fail_delete: HashSet::new(),
            fail_script: HashSet::new(),
            fail_bootstrap: HashSet::new(),
            hang_bootstrap: HashSet::new(),
            bootstrap_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a mock runtime with the given containers already present.
    pub fn with_containers<I, S>(hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let runtime = Self::new();
        {
            let mut containers = lock(&runtime.containers);
            for hostname in hostnames {
                let c = Container::local(hostname);
                containers.insert(c.hostname.clone(), c);
            }
        }
        runtime
    }

    /// Fail every `list_containers` call.
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn fail_create_for(mut self, hostname: &str) -> Self {
        self.fail_create.insert(hostname.to_string());
        self
    }

    pub fn fail_delete_for(mut self, hostname: &str) -> Self {
        self.fail_delete.insert(hostname.to_string());
        self
    }

    pub fn fail_script_for(mut self, hostname: &str) -> Self {
        self.fail_script.insert(hostname.to_string());
        self
    }

    pub fn fail_bootstrap_for(mut self, hostname: &str) -> Self {
        self.fail_bootstrap.insert(hostname.to_string());
        self
    }

    /// Bootstrap for `hostname` never returns.
    pub fn hang_bootstrap_for(mut self, hostname: &str) -> Self {
        self.hang_bootstrap.insert(hostname.to_string());
        self
    }

    pub fn with_bootstrap_delay(mut self, delay: Duration) -> Self {
        self.bootstrap_delay = delay;
        self
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        lock(&self.calls).clone()
    }

    /// Hostnames currently present.
    pub fn hostnames(&self) -> Vec<String> {
        lock(&self.containers).keys().cloned().collect()
    }

    /// Highest number of bootstraps observed running at once.
    pub fn max_concurrent_bootstraps(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: RuntimeCall) {
        lock(&self.calls).push(call);
    }

    fn next_ipaddress(&self) -> String {
        let n = self.ip_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ipv4Addr::from(0x0a00_0000 | (n & 0x00ff_ffff)).to_string()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decrements the in-flight gauge when a bootstrap call ends or is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self) -> Result<Vec<Container>> {
        self.record(RuntimeCall::List);
        if self.fail_list {
            anyhow::bail!("Mock runtime configured to fail listing");
        }
        Ok(lock(&self.containers).values().cloned().collect())
    }

    async fn create_container(&self, hostname: &str, image: &str) -> Result<String> {
        self.record(RuntimeCall::Create {
            hostname: hostname.to_string(),
            image: image.to_string(),
        });
        if self.fail_create.contains(hostname) {
            anyhow::bail!("Mock runtime configured to fail creating {hostname}");
        }

        let ipaddress = self.next_ipaddress();
        info!(hostname, image, ipaddress = %ipaddress, "[MOCK] Creating container");

        let mut container = Container::local(hostname);
        container.image = image.to_string();
        container.ipaddress = Some(ipaddress.clone());
        lock(&self.containers).insert(hostname.to_string(), container);

        Ok(ipaddress)
    }

    async fn delete_container(&self, hostname: &str) -> Result<()> {
        self.record(RuntimeCall::Delete {
            hostname: hostname.to_string(),
        });
        if self.fail_delete.contains(hostname) {
            anyhow::bail!("Mock runtime configured to fail deleting {hostname}");
        }

        info!(hostname, "[MOCK] Deleting container");
        if lock(&self.containers).remove(hostname).is_none() {
            anyhow::bail!("container not found: {hostname}");
        }
        Ok(())
    }

    async fn create_container_bootstrap_script(&self, container: &Container) -> Result<()> {
        self.record(RuntimeCall::BootstrapScript {
            hostname: container.hostname.clone(),
        });
        if self.fail_script.contains(&container.hostname) {
            anyhow::bail!(
                "Mock runtime configured to fail bootstrap script for {}",
                container.hostname
            );
        }
        debug!(hostname = %container.hostname, "[MOCK] Bootstrap script written");
        Ok(())
    }

    async fn validate_and_bootstrap_container(&self, container: &Container) -> Result<()> {
        self.record(RuntimeCall::Bootstrap {
            hostname: container.hostname.clone(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang_bootstrap.contains(&container.hostname) {
            std::future::pending::<()>().await;
        }
        if !self.bootstrap_delay.is_zero() {
            tokio::time::sleep(self.bootstrap_delay).await;
        }

        if self.fail_bootstrap.contains(&container.hostname) {
            anyhow::bail!(
                "Mock runtime configured to fail bootstrapping {}",
                container.hostname
            );
        }
        debug!(hostname = %container.hostname, "[MOCK] Container bootstrapped");
        Ok(())
    }
}
