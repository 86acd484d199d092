//! Error types for reconciliation passes.

use thiserror::Error;

/// Reasons a reconciliation pass did not complete.
///
/// Per-container create/delete failures are not represented here; they are
/// logged and counted in the pass summary instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Could not fetch the desired container set.
    #[error("fetch_desired_failed: {0:#}")]
    FetchDesired(#[source] anyhow::Error),

    /// Could not list containers from the local runtime.
    #[error("list_actual_failed: {0:#}")]
    ListActual(#[source] anyhow::Error),

    /// Could not fetch containers awaiting bootstrap.
    #[error("fetch_provisioned_failed: {0:#}")]
    FetchProvisioned(#[source] anyhow::Error),

    /// Container has no bootstrap steps configured.
    #[error("bootstrappers_missing: container {hostname}")]
    MissingBootstrappers { hostname: String },

    /// Runtime could not generate the bootstrap script.
    #[error("bootstrap_script_failed: container {hostname}: {source:#}")]
    BootstrapScript {
        hostname: String,
        #[source]
        source: anyhow::Error,
    },

    /// One or more containers in the batch failed script generation.
    #[error("bootstrap_batch_failed: {}", failed.join(", "))]
    BootstrapBatch { failed: Vec<String> },

    /// The bootstrap token pool was closed.
    #[error("token pool closed")]
    PoolClosed,
}

impl AgentError {
    /// Get the standardized reason code for this error.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AgentError::FetchDesired(_) => "fetch_desired_failed",
            AgentError::ListActual(_) => "list_actual_failed",
            AgentError::FetchProvisioned(_) => "fetch_provisioned_failed",
            AgentError::MissingBootstrappers { .. } => "bootstrappers_missing",
            AgentError::BootstrapScript { .. } => "bootstrap_script_failed",
            AgentError::BootstrapBatch { .. } => "bootstrap_batch_failed",
            AgentError::PoolClosed => "pool_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AgentError::MissingBootstrappers {
            hostname: "test-c-01".to_string(),
        };
        assert_eq!(err.to_string(), "bootstrappers_missing: container test-c-01");
        assert_eq!(err.reason_code(), "bootstrappers_missing");

        let err = AgentError::BootstrapBatch {
            failed: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "bootstrap_batch_failed: a, b");
    }

    #[test]
    fn test_wrapped_source_is_rendered() {
        let err = AgentError::FetchDesired(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "fetch_desired_failed: connection refused");
    }
}
