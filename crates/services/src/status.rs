//! Service instance status state machine.
//!
//! ```text
//! STARTING --(init ok)---------> RUNNING
//! STARTING --(init fails)------> CRASHED
//! RUNNING  --(terminate)-------> TERMINATING --(cleanup done)--> SHUTDOWN
//! RUNNING  --(runtime fault)---> CRASHED
//! ```
//!
//! SHUTDOWN and CRASHED are terminal; there is no automatic restart from
//! CRASHED. An operator-triggered re-initialize starts a fresh STARTING pass
//! through [`ServiceStatus::reinitialize`], never through a machine edge.

use serde::{Deserialize, Serialize};

/// Runtime status of one managed service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Starting,
    Running,
    Terminating,
    Crashed,
    Shutdown,
}

impl ServiceStatus {
    /// Whether `next` is reachable from `self` along a machine edge.
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Crashed)
                | (Running, Terminating)
                | (Running, Crashed)
                | (Terminating, Shutdown)
        )
    }

    /// Terminal states require operator action to leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Crashed | Self::Shutdown)
    }

    /// Explicit operator re-initialize: allowed only from a terminal state,
    /// and always lands on STARTING.
    pub fn reinitialize(self) -> Option<ServiceStatus> {
        self.is_terminal().then_some(Self::Starting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Crashed => "crashed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted on every status transition for observability collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusUpdate {
    pub service_id: i64,
    pub status: ServiceStatus,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ServiceStatus; 5] = [
        ServiceStatus::Starting,
        ServiceStatus::Running,
        ServiceStatus::Terminating,
        ServiceStatus::Crashed,
        ServiceStatus::Shutdown,
    ];

    #[test]
    fn only_machine_edges_are_allowed() {
        let edges = [
            (ServiceStatus::Starting, ServiceStatus::Running),
            (ServiceStatus::Starting, ServiceStatus::Crashed),
            (ServiceStatus::Running, ServiceStatus::Terminating),
            (ServiceStatus::Running, ServiceStatus::Crashed),
            (ServiceStatus::Terminating, ServiceStatus::Shutdown),
        ];
        for from in ALL {
            for to in ALL {
                let expected = edges.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "transition {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn running_is_only_reachable_from_starting() {
        for from in ALL {
            if from != ServiceStatus::Starting {
                assert!(!from.can_transition_to(ServiceStatus::Running));
            }
        }
    }

    #[test]
    fn terminal_states_need_explicit_reinitialize() {
        for terminal in [ServiceStatus::Crashed, ServiceStatus::Shutdown] {
            for to in ALL {
                assert!(!terminal.can_transition_to(to));
            }
            assert_eq!(terminal.reinitialize(), Some(ServiceStatus::Starting));
        }
        assert_eq!(ServiceStatus::Running.reinitialize(), None);
    }
}
