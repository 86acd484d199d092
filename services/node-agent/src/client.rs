//! Control plane API client for the node agent.
//!
//! Provides methods for communicating with the control plane:
//! - Fetching scheduled and provisioned containers for this node
//! - Reporting ipaddress and status transitions

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Config;
use crate::container::Container;
use crate::control_plane::ControlPlane;

const CONTAINERS_PATH: &str = "/api/v1/node/containers";

/// Control plane API client.
pub struct ControlPlaneClient {
    client: reqwest::Client,
    base_url: String,
}

impl ControlPlaneClient {
    /// Create a new control plane client.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(&config.server_addr, config.request_timeout)
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}{}/{}", self.base_url, CONTAINERS_PATH, action)
    }

    async fn fetch_list(&self, action: &str, node: &str) -> Result<Vec<Container>> {
        let url = self.url(action);
        debug!(url = %url, node_hostname = node, "Fetching containers");

        let response = self
            .client
            .get(&url)
            .query(&[("node_hostname", node)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, action, "Failed to fetch containers");
            anyhow::bail!("Failed to fetch {}: {} - {}", action, status, body);
        }

        let payload: ListResponse = response
            .json()
            .await
            .with_context(|| format!("Malformed {action} response"))?;
        debug!(
            api_version = %payload.api_version,
            container_count = payload.data.items.len(),
            action,
            "Fetched containers"
        );

        Ok(payload.data.items)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        action: &str,
        node: &str,
        hostname: &str,
        body: Option<&B>,
    ) -> Result<()> {
        let url = self.url(action);
        debug!(url = %url, node_hostname = node, hostname, "Reporting container update");

        let mut request = self
            .client
            .post(&url)
            .query(&[("node_hostname", node), ("hostname", hostname)]);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, action, hostname, "Failed to report update");
            anyhow::bail!("Failed to {} {}: {} - {}", action, hostname, status, body);
        }

        Ok(())
    }

    async fn mark(&self, action: &str, node: &str, hostname: &str) -> Result<()> {
        self.post::<()>(action, node, hostname, None).await
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn fetch_containers(&self, node: &str) -> Result<Vec<Container>> {
        self.fetch_list("scheduled", node).await
    }

    async fn fetch_provisioned_containers(&self, node: &str) -> Result<Vec<Container>> {
        self.fetch_list("bootstrap_scheduled", node).await
    }

    async fn update_ipaddress(&self, node: &str, hostname: &str, ipaddress: &str) -> Result<()> {
        let body = IpaddressRequest {
            container: IpaddressUpdate { ipaddress },
        };
        self.post("ipaddress", node, hostname, Some(&body)).await
    }

    async fn mark_provisioned(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark("mark_provisioned", node, hostname).await
    }

    async fn mark_deleted(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark("mark_deleted", node, hostname).await
    }

    async fn mark_bootstrap_started(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark("mark_bootstrap_started", node, hostname).await
    }

    async fn mark_bootstrapped(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark("mark_bootstrapped", node, hostname).await
    }

    async fn mark_bootstrap_error(&self, node: &str, hostname: &str) -> Result<()> {
        self.mark("mark_bootstrap_error", node, hostname).await
    }
}

/// List envelope returned by the control plane.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub api_version: String,
    pub data: ListData,
}

#[derive(Debug, Deserialize)]
pub struct ListData {
    #[serde(default)]
    pub items: Vec<Container>,
}

#[derive(Debug, Serialize)]
struct IpaddressRequest<'a> {
    container: IpaddressUpdate<'a>,
}

#[derive(Debug, Serialize)]
struct IpaddressUpdate<'a> {
    ipaddress: &'a str,
}
