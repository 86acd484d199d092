//! Reconciliation primitives for the pathfinder node agent.
//!
//! This library holds the pure, I/O-free half of the agent:
//!
//! - **Lifecycle**: the container status state machine. Given a current status
//!   and an observed event it decides the next status and which control-plane
//!   call (if any) reports the transition.
//! - **Diff**: partitioning of the desired set (from the control plane) against
//!   the actual set (from the local runtime), keyed by hostname.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - Status transitions are monotonic; terminal states accept no events
//! - Each transition yields at most one status push

pub mod diff;
pub mod lifecycle;

use std::time::Duration;

pub use diff::{diff_by_hostname, Diff};
pub use lifecycle::{
    transition, ContainerStatus, LifecycleError, LifecycleEvent, StatusPush, Transition,
};

/// Default interval between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of bootstrap executions allowed in flight at once.
pub const DEFAULT_BOOTSTRAP_MAX_CONCURRENT: usize = 5;
