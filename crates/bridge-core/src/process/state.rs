//! The per-process state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed process.
///
/// `Stopped` is the only initial state. `Failed` is terminal for automatic
/// recovery; only an explicit `start` or `restart` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
    Backoff,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Failed => "failed",
            ProcessState::Backoff => "backoff",
        }
    }

    /// States in which the record may own a live OS process.
    pub fn holds_handle(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    /// The single authority on legal edges.
    ///
    /// Besides the nominal lifecycle, every non-stopped state may fall back to
    /// `Stopped`: that is how a stale record is reconciled once its process is
    /// known to be gone, or a cancelled start/backoff is rolled back.
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        use ProcessState::*;

        match (self, next) {
            (Stopped, Starting) | (Stopped, Backoff) => true,
            (Starting, Running) | (Starting, Failed) => true,
            (Running, Stopping) | (Running, Backoff) | (Running, Failed) => true,
            (Backoff, Starting) | (Backoff, Failed) => true,
            (Failed, Starting) => true,
            (Stopped, Stopped) => false,
            (_, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
