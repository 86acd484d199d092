//! Configuration for the node agent.

use std::time::Duration;

use anyhow::{Context, Result};
use pathfinder_reconcile::{DEFAULT_BOOTSTRAP_MAX_CONCURRENT, DEFAULT_RECONCILE_INTERVAL};

use crate::reconciler::BootstrapFailurePolicy;

/// Node agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname of this node as known to the control plane.
    pub node_hostname: String,

    /// Control plane API URL.
    pub server_addr: String,

    /// Timeout for a single control-plane request.
    pub request_timeout: Duration,

    /// Interval between provisioning passes.
    pub provision_interval: Duration,

    /// Interval between bootstrap passes.
    pub bootstrap_interval: Duration,

    /// Maximum number of containers bootstrapping at once.
    pub bootstrap_max_concurrent: usize,

    /// Deadline for a single bootstrap execution. `None` waits forever.
    pub bootstrap_timeout: Option<Duration>,

    /// What a bootstrap pass does after a script-generation failure.
    pub bootstrap_failure_policy: BootstrapFailurePolicy,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_hostname = lookup("PF_NODE_HOSTNAME")
            .or_else(|| lookup("HOSTNAME"))
            .filter(|h| !h.is_empty())
            .context("Missing node hostname. Set PF_NODE_HOSTNAME.")?;

        let server_addr =
            lookup("PF_SERVER_ADDR").unwrap_or_else(|| "http://127.0.0.1:3000".to_string());

        let request_timeout_secs: u64 =
            parse(&lookup, "PF_REQUEST_TIMEOUT_SECS")?.unwrap_or(30);

        let provision_interval_secs: u64 = parse(&lookup, "PF_PROVISION_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL.as_secs());

        let bootstrap_interval_secs: u64 = parse(&lookup, "PF_BOOTSTRAP_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL.as_secs());

        let bootstrap_max_concurrent: usize = parse(&lookup, "PF_BOOTSTRAP_MAX_CONCURRENT")?
            .unwrap_or(DEFAULT_BOOTSTRAP_MAX_CONCURRENT)
            .max(1);

        let bootstrap_timeout_secs: u64 =
            parse(&lookup, "PF_BOOTSTRAP_TIMEOUT_SECS")?.unwrap_or(3600);
        let bootstrap_timeout =
            (bootstrap_timeout_secs > 0).then(|| Duration::from_secs(bootstrap_timeout_secs));

        let fail_fast: bool = parse(&lookup, "PF_BOOTSTRAP_FAIL_FAST")?.unwrap_or(false);
        let bootstrap_failure_policy = if fail_fast {
            BootstrapFailurePolicy::FailFast
        } else {
            BootstrapFailurePolicy::Isolate
        };

        let log_level = lookup("PF_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            node_hostname,
            server_addr,
            request_timeout: Duration::from_secs(request_timeout_secs.max(1)),
            provision_interval: Duration::from_secs(provision_interval_secs.max(1)),
            bootstrap_interval: Duration::from_secs(bootstrap_interval_secs.max(1)),
            bootstrap_max_concurrent,
            bootstrap_timeout,
            bootstrap_failure_policy,
            log_level,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("{key} has an invalid value."))
}
