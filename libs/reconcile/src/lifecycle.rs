//! Container lifecycle state machine.
//!
//! ```text
//! SCHEDULED ──created──▶ PROVISIONED ──script-ready──▶ BOOTSTRAP_STARTED ──ok──▶ BOOTSTRAPPED
//!                              │                               │
//!                              └──script-failed──┐   ┌──failed─┘
//!                                                ▼   ▼
//!                                           BOOTSTRAP_ERROR
//!
//! SCHEDULE_DELETION ──delete-succeeded──▶ DELETED
//! ```
//!
//! Failure events that leave the container where it was (`ProvisionFailed`,
//! `DeleteFailed`) produce no push; the next pass re-evaluates from fresh state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The event is not valid in the current status.
    #[error("invalid transition: {event} while {from}")]
    InvalidTransition {
        from: ContainerStatus,
        event: LifecycleEvent,
    },

    /// A status string that is not part of the lifecycle.
    #[error("unknown container status: {0}")]
    UnknownStatus(String),
}

/// Container status as recorded by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    /// Desired but not yet present locally.
    Scheduled,
    /// Created locally with an ipaddress assigned.
    Provisioned,
    /// Bootstrap script generated, execution launched.
    BootstrapStarted,
    /// Bootstrap finished successfully (terminal).
    Bootstrapped,
    /// Script generation or execution failed (terminal).
    BootstrapError,
    /// The control plane wants the container removed.
    ScheduleDeletion,
    /// Removed locally (terminal).
    Deleted,
    /// Any status this agent does not know about. Treated like `Scheduled`.
    #[serde(other)]
    Unknown,
}

impl ContainerStatus {
    /// Returns true if no further event is accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Bootstrapped | Self::BootstrapError | Self::Deleted
        )
    }

    /// Wire name used by the control plane.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Provisioned => "PROVISIONED",
            Self::BootstrapStarted => "BOOTSTRAP_STARTED",
            Self::Bootstrapped => "BOOTSTRAPPED",
            Self::BootstrapError => "BOOTSTRAP_ERROR",
            Self::ScheduleDeletion => "SCHEDULE_DELETION",
            Self::Deleted => "DELETED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "PROVISIONED" => Ok(Self::Provisioned),
            "BOOTSTRAP_STARTED" => Ok(Self::BootstrapStarted),
            "BOOTSTRAPPED" => Ok(Self::Bootstrapped),
            "BOOTSTRAP_ERROR" => Ok(Self::BootstrapError),
            "SCHEDULE_DELETION" => Ok(Self::ScheduleDeletion),
            "DELETED" => Ok(Self::Deleted),
            other => Err(LifecycleError::UnknownStatus(other.to_string())),
        }
    }
}

/// Something the agent observed about a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The container exists locally (freshly created or already present).
    Created,
    ProvisionFailed,
    ScriptReady,
    ScriptFailed,
    /// A bootstrap unit picked the container up.
    BootstrapStarted,
    BootstrapSucceeded,
    BootstrapFailed,
    DeleteSucceeded,
    DeleteFailed,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::ProvisionFailed => "provision-failed",
            Self::ScriptReady => "script-ready",
            Self::ScriptFailed => "script-failed",
            Self::BootstrapStarted => "bootstrap-started",
            Self::BootstrapSucceeded => "bootstrap-succeeded",
            Self::BootstrapFailed => "bootstrap-failed",
            Self::DeleteSucceeded => "delete-succeeded",
            Self::DeleteFailed => "delete-failed",
        };
        f.write_str(name)
    }
}

/// Control-plane call that reports a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusPush {
    MarkProvisioned,
    MarkDeleted,
    MarkBootstrapStarted,
    MarkBootstrapped,
    MarkBootstrapError,
}

impl StatusPush {
    /// Status the control plane records once the push lands.
    pub fn status(&self) -> ContainerStatus {
        match self {
            Self::MarkProvisioned => ContainerStatus::Provisioned,
            Self::MarkDeleted => ContainerStatus::Deleted,
            Self::MarkBootstrapStarted => ContainerStatus::BootstrapStarted,
            Self::MarkBootstrapped => ContainerStatus::Bootstrapped,
            Self::MarkBootstrapError => ContainerStatus::BootstrapError,
        }
    }
}

/// Outcome of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status after the event.
    pub to: ContainerStatus,

    /// Push to emit, `None` when the status is unchanged.
    pub push: Option<StatusPush>,
}

impl Transition {
    fn stay(to: ContainerStatus) -> Self {
        Self { to, push: None }
    }

    fn report(push: StatusPush) -> Self {
        Self {
            to: push.status(),
            push: Some(push),
        }
    }
}

/// Apply `event` to a container in `current` status.
pub fn transition(
    current: ContainerStatus,
    event: LifecycleEvent,
) -> Result<Transition, LifecycleError> {
    use ContainerStatus as S;
    use LifecycleEvent as E;

    match (current, event) {
        (S::Scheduled | S::Unknown, E::Created) => {
            Ok(Transition::report(StatusPush::MarkProvisioned))
        }
        (S::Scheduled | S::Unknown, E::ProvisionFailed) => Ok(Transition::stay(current)),

        (S::Provisioned, E::ScriptReady) => {
            Ok(Transition::report(StatusPush::MarkBootstrapStarted))
        }
        (S::Provisioned, E::ScriptFailed) => {
            Ok(Transition::report(StatusPush::MarkBootstrapError))
        }

        (S::BootstrapStarted, E::BootstrapStarted) => Ok(Transition::stay(current)),
        (S::BootstrapStarted, E::BootstrapSucceeded) => {
            Ok(Transition::report(StatusPush::MarkBootstrapped))
        }
        (S::BootstrapStarted, E::BootstrapFailed) => {
            Ok(Transition::report(StatusPush::MarkBootstrapError))
        }

        (S::ScheduleDeletion, E::DeleteSucceeded) => {
            Ok(Transition::report(StatusPush::MarkDeleted))
        }
        (S::ScheduleDeletion, E::DeleteFailed) => Ok(Transition::stay(current)),

        (from, event) => Err(LifecycleError::InvalidTransition { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use ContainerStatus as S;
    use LifecycleEvent as E;
    use StatusPush as P;

    #[rstest]
    #[case(S::Scheduled, E::Created, S::Provisioned, Some(P::MarkProvisioned))]
    #[case(S::Unknown, E::Created, S::Provisioned, Some(P::MarkProvisioned))]
    #[case(S::Scheduled, E::ProvisionFailed, S::Scheduled, None)]
    #[case(S::Provisioned, E::ScriptReady, S::BootstrapStarted, Some(P::MarkBootstrapStarted))]
    #[case(S::Provisioned, E::ScriptFailed, S::BootstrapError, Some(P::MarkBootstrapError))]
    #[case(S::BootstrapStarted, E::BootstrapStarted, S::BootstrapStarted, None)]
    #[case(S::BootstrapStarted, E::BootstrapSucceeded, S::Bootstrapped, Some(P::MarkBootstrapped))]
    #[case(S::BootstrapStarted, E::BootstrapFailed, S::BootstrapError, Some(P::MarkBootstrapError))]
    #[case(S::ScheduleDeletion, E::DeleteSucceeded, S::Deleted, Some(P::MarkDeleted))]
    #[case(S::ScheduleDeletion, E::DeleteFailed, S::ScheduleDeletion, None)]
    fn test_valid_transitions(
        #[case] from: ContainerStatus,
        #[case] event: LifecycleEvent,
        #[case] to: ContainerStatus,
        #[case] push: Option<StatusPush>,
    ) {
        let t = transition(from, event).unwrap();
        assert_eq!(t.to, to);
        assert_eq!(t.push, push);
    }

    #[rstest]
    #[case(ContainerStatus::Bootstrapped)]
    #[case(ContainerStatus::BootstrapError)]
    #[case(ContainerStatus::Deleted)]
    fn test_terminal_states_reject_everything(#[case] from: ContainerStatus) {
        assert!(from.is_terminal());
        for event in [
            LifecycleEvent::Created,
            LifecycleEvent::ScriptReady,
            LifecycleEvent::BootstrapSucceeded,
            LifecycleEvent::BootstrapFailed,
            LifecycleEvent::DeleteSucceeded,
        ] {
            assert_eq!(
                transition(from, event),
                Err(LifecycleError::InvalidTransition { from, event })
            );
        }
    }

    #[test]
    fn test_created_does_not_rewind_provisioned() {
        let err = transition(ContainerStatus::Provisioned, LifecycleEvent::Created).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition: created while PROVISIONED"
        );
    }

    #[test]
    fn test_deletion_only_from_schedule_deletion() {
        assert!(transition(ContainerStatus::Scheduled, LifecycleEvent::DeleteSucceeded).is_err());
        assert!(transition(ContainerStatus::Provisioned, LifecycleEvent::DeleteSucceeded).is_err());
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&ContainerStatus::ScheduleDeletion).unwrap();
        assert_eq!(json, "\"SCHEDULE_DELETION\"");

        let status: ContainerStatus = serde_json::from_str("\"BOOTSTRAP_STARTED\"").unwrap();
        assert_eq!(status, ContainerStatus::BootstrapStarted);

        let unknown: ContainerStatus = serde_json::from_str("\"PROVISION_ERROR\"").unwrap();
        assert_eq!(unknown, ContainerStatus::Unknown);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("DELETED".parse::<ContainerStatus>(), Ok(ContainerStatus::Deleted));
        assert!("deleted".parse::<ContainerStatus>().is_err());
    }
}
