//! Container records exchanged with the control plane and the local runtime.
//!
//! The same shape is used for both copies: the control-plane record carries
//! the desired attributes and a status, the runtime record is only consulted
//! for its hostname.

use pathfinder_reconcile::ContainerStatus;
use serde::{Deserialize, Serialize};

/// A container assigned to (or found on) this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Unique within a node; the join key between desired and actual sets.
    pub hostname: String,

    #[serde(default)]
    pub ipaddress: Option<String>,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub source: Source,

    /// Ordered bootstrap steps. May be empty.
    #[serde(default)]
    pub bootstrappers: Vec<Bootstrapper>,

    /// Lifecycle status. Only present on control-plane records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContainerStatus>,
}

/// Where the container image comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub source_type: String,

    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub mode: String,

    #[serde(default)]
    pub remote: Remote,
}

/// Remote image server details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    #[serde(default)]
    pub server: String,

    #[serde(default)]
    pub protocol: String,

    #[serde(default)]
    pub auth_type: String,
}

/// One bootstrap step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrapper {
    pub bootstrap_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_cookbooks_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_attributes: Option<serde_json::Value>,
}

impl Container {
    /// Create a scheduled container record.
    pub fn scheduled(hostname: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            image: image.into(),
            status: Some(ContainerStatus::Scheduled),
            ..Self::default()
        }
    }

    /// Create a runtime-side record, which only carries identity.
    pub fn local(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ContainerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_bootstrappers(mut self, bootstrappers: Vec<Bootstrapper>) -> Self {
        self.bootstrappers = bootstrappers;
        self
    }

    /// Status to reason from; records without one are treated as scheduled.
    pub fn status_or_scheduled(&self) -> ContainerStatus {
        self.status.unwrap_or(ContainerStatus::Scheduled)
    }

    pub fn is_scheduled_for_deletion(&self) -> bool {
        self.status == Some(ContainerStatus::ScheduleDeletion)
    }

    /// Bootstrap step types in order, for log output.
    pub fn bootstrapper_types(&self) -> Vec<&str> {
        self.bootstrappers
            .iter()
            .map(|b| b.bootstrap_type.as_str())
            .collect()
    }

    /// Span carrying the full container context for log records.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "container",
            hostname = %self.hostname,
            ipaddress = %self.ipaddress.as_deref().unwrap_or(""),
            source_type = %self.source.source_type,
            alias = %self.source.alias,
            mode = %self.source.mode,
            server = %self.source.remote.server,
            protocol = %self.source.remote.protocol,
            auth_type = %self.source.remote.auth_type,
            bootstrappers = ?self.bootstrapper_types(),
        )
    }
}

impl Bootstrapper {
    pub fn new(bootstrap_type: impl Into<String>) -> Self {
        Self {
            bootstrap_type: bootstrap_type.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_deserialization() {
        let json = r#"{
            "hostname": "test-c-01",
            "ipaddress": "10.0.0.12",
            "image": "16.04",
            "source": {
                "source_type": "image",
                "alias": "16.04",
                "mode": "pull",
                "remote": {
                    "server": "https://cloud-images.ubuntu.com/releases",
                    "protocol": "simplestreams",
                    "auth_type": "none"
                }
            },
            "bootstrappers": [
                {
                    "bootstrap_type": "chef-solo",
                    "bootstrap_cookbooks_url": "https://example.com/cookbooks.tar.gz",
                    "bootstrap_attributes": {"run_list": ["role[web]"]}
                }
            ],
            "status": "PROVISIONED"
        }"#;

        let container: Container = serde_json::from_str(json).unwrap();
        assert_eq!(container.hostname, "test-c-01");
        assert_eq!(container.ipaddress.as_deref(), Some("10.0.0.12"));
        assert_eq!(container.source.remote.protocol, "simplestreams");
        assert_eq!(container.bootstrapper_types(), vec!["chef-solo"]);
        assert_eq!(container.status, Some(ContainerStatus::Provisioned));
    }

    #[test]
    fn test_minimal_container_deserialization() {
        let container: Container = serde_json::from_str(r#"{"hostname": "bare"}"#).unwrap();
        assert_eq!(container.hostname, "bare");
        assert!(container.bootstrappers.is_empty());
        assert_eq!(container.status, None);
        assert_eq!(container.status_or_scheduled(), ContainerStatus::Scheduled);
    }

    #[test]
    fn test_deletion_flag() {
        let c = Container::scheduled("c1", "16.04").with_status(ContainerStatus::ScheduleDeletion);
        assert!(c.is_scheduled_for_deletion());
        assert!(!Container::local("c1").is_scheduled_for_deletion());
    }
}
