//! Worker lifecycle states.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{SwError, SwResult};

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Initial state, script parsed.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl WorkerState {
    fn can_become(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (_, Redundant)
        )
    }
}

/// Lifecycle record of the one worker a host runs.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Worker ID.
    pub id: WorkerId,

    /// Current state.
    pub state: WorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    pub fn new() -> Self {
        Self {
            id: WorkerId::new(),
            state: WorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: WorkerState) -> SwResult<()> {
        if !self.state.can_become(next) {
            return Err(SwError::State(format!(
                "cannot go from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        self.state_changed_at = Instant::now();
        Ok(())
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Activated
    }

    /// Check if installed and waiting.
    pub fn is_waiting(&self) -> bool {
        self.state == WorkerState::Installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = Registration::new();
        assert_eq!(registration.state, WorkerState::Parsed);

        registration.transition(WorkerState::Installing).unwrap();
        registration.transition(WorkerState::Installed).unwrap();
        assert!(registration.is_waiting());

        registration.transition(WorkerState::Activating).unwrap();
        registration.transition(WorkerState::Activated).unwrap();
        assert!(registration.is_active());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut registration = Registration::new();
        let result = registration.transition(WorkerState::Activated);
        assert!(matches!(result, Err(SwError::State(_))));
        assert_eq!(registration.state, WorkerState::Parsed);
    }

    #[test]
    fn test_any_state_can_become_redundant() {
        let mut registration = Registration::new();
        registration.transition(WorkerState::Installing).unwrap();
        registration.transition(WorkerState::Redundant).unwrap();
        assert_eq!(registration.state, WorkerState::Redundant);
    }

    #[test]
    fn test_worker_ids_unique() {
        assert_ne!(Registration::new().id, Registration::new().id);
    }
}
