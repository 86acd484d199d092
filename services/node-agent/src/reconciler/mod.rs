//! Reconcilers that converge this node toward the control plane's desired state.
//!
//! - [`ProvisionReconciler`]: creates missing containers and deletes
//!   containers scheduled for deletion
//! - [`BootstrapReconciler`]: generates bootstrap scripts and runs them with
//!   bounded concurrency
//!
//! Both re-fetch ground truth on every pass and keep nothing between passes.

mod bootstrap;
mod provision;

pub use bootstrap::{BootstrapFailurePolicy, BootstrapReconciler, BootstrapSummary};
pub use provision::{ProvisionReconciler, ProvisionSummary};

use pathfinder_reconcile::{transition, ContainerStatus, LifecycleEvent, Transition};
use tracing::{debug, warn};

use crate::control_plane::ControlPlane;

/// Run `event` through the lifecycle and send the resulting push, if any.
///
/// Returns `None` when the lifecycle rejects the event. A failed push is
/// logged and otherwise ignored; the next pass sees whatever the control
/// plane recorded.
async fn apply_event(
    control_plane: &dyn ControlPlane,
    node: &str,
    hostname: &str,
    from: ContainerStatus,
    event: LifecycleEvent,
) -> Option<Transition> {
    let t = match transition(from, event) {
        Ok(t) => t,
        Err(e) => {
            debug!(error = %e, "Event ignored by lifecycle");
            return None;
        }
    };

    if let Some(push) = t.push {
        match control_plane.push(node, hostname, push).await {
            Ok(()) => debug!(status = %t.to, "Status reported"),
            Err(e) => warn!(error = %e, status = %t.to, "Failed to report status"),
        }
    }

    Some(t)
}
