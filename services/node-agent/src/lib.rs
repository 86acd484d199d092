//! pathfinder Node Agent Library
//!
//! The node agent runs on each cluster member. It fetches the containers the
//! control plane has assigned to this node, converges the local container
//! runtime to match, and reports each container's lifecycle back.
//!
//! ## Architecture
//!
//! ```text
//! run_agent_loop (timer)
//! ├── ProvisionReconciler   (create / delete, sequential)
//! └── BootstrapReconciler   (script generation, then bounded concurrent execution)
//!         └── Launcher + TokenPool
//! ```
//!
//! ## Modules
//!
//! - `runtime`: local container runtime interface
//! - `control_plane`: control-plane interface; `client` is its HTTP implementation
//! - `reconciler`: the provisioning and bootstrap passes
//! - `pool`, `launcher`: concurrency limit and launch strategy for bootstraps
//! - `agent`: uniform `Agent::run` and the scheduling loop

pub mod agent;
pub mod client;
pub mod config;
pub mod container;
pub mod control_plane;
pub mod error;
pub mod launcher;
pub mod pool;
pub mod reconciler;
pub mod runtime;

// Re-export commonly used types
pub use agent::{run_agent_loop, Agent};
pub use client::ControlPlaneClient;
pub use container::{Bootstrapper, Container, Remote, Source};
pub use control_plane::{ControlPlane, MockControlPlane};
pub use error::AgentError;
pub use reconciler::{BootstrapReconciler, ProvisionReconciler};
pub use runtime::{ContainerRuntime, MockRuntime};
