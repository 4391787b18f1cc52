//! Mutable runtime state of one managed process.

use super::state::ProcessState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::ExitStatus;
use tokio::sync::watch;
use tracing::{debug, warn};

/// How a process instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Exit of a process whose status could not be collected.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Live handle to one spawned instance.
///
/// The OS child itself is owned by the reaper task; the handle carries the
/// pid and a view of the exit channel, so it can be cloned freely.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    instance: u64,
    pid: u32,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ProcessHandle {
    pub(crate) fn new(instance: u64, pid: u32, exit: watch::Receiver<Option<ExitInfo>>) -> Self {
        Self {
            instance,
            pid,
            exit,
        }
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, if the reaper has observed it.
    pub(crate) fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit.borrow()
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exit_info().is_some()
    }

    /// Wait for the instance to exit.
    pub(crate) async fn wait(&self) -> ExitInfo {
        let mut rx = self.exit.clone();
        // Bound so the borrowed `watch::Ref` is released before `rx`.
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(info) => (*info).unwrap_or_default(),
            // The reaper vanished without reporting; the child is gone with it.
            Err(_) => ExitInfo::unknown(),
        };
        exit
    }
}

/// Runtime information about a managed process.
#[derive(Debug)]
pub struct ProcessRecord {
    state: ProcessState,
    handle: Option<ProcessHandle>,
    start_time: Option<DateTime<Utc>>,
    restart_count: u32,
    last_restart_time: Option<DateTime<Utc>>,
    last_exit: Option<ExitInfo>,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRecord {
    pub fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            handle: None,
            start_time: None,
            restart_count: 0,
            last_restart_time: None,
            last_exit: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count
    }

    pub fn last_restart_time(&self) -> Option<DateTime<Utc>> {
        self.last_restart_time
    }

    pub fn last_exit(&self) -> Option<ExitInfo> {
        self.last_exit
    }

    pub(crate) fn handle(&self) -> Option<&ProcessHandle> {
        self.handle.as_ref()
    }

    pub(crate) fn current_instance(&self) -> Option<u64> {
        self.handle.as_ref().map(ProcessHandle::instance)
    }

    /// Move to `next`, validating the edge.
    ///
    /// Entering a state that cannot own a process drops the handle, keeping
    /// "handle present" and "state holds a handle" in lockstep.
    pub(crate) fn transition(&mut self, name: &str, next: ProcessState) {
        let current = self.state;
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition for '{name}': {current} -> {next}"
        );
        if !current.can_transition_to(next) {
            warn!(process = %name, from = %current, to = %next, "Illegal state transition");
        }
        debug!(process = %name, from = %current, to = %next, "State transition");

        self.state = next;
        if !next.holds_handle() {
            if let Some(handle) = self.handle.take() {
                if let Some(exit) = handle.exit_info() {
                    self.last_exit = Some(exit);
                }
            }
        }
    }

    /// Record a freshly spawned instance and mark it running.
    pub(crate) fn attach(&mut self, name: &str, handle: ProcessHandle) {
        self.handle = Some(handle);
        self.start_time = Some(Utc::now());
        self.transition(name, ProcessState::Running);
    }

    pub(crate) fn record_exit(&mut self, exit: ExitInfo) {
        self.last_exit = Some(exit);
    }

    /// Count one restart attempt. Never decreases.
    pub(crate) fn record_restart(&mut self) {
        self.restart_count = self.restart_count.saturating_add(1);
        self.last_restart_time = Some(Utc::now());
    }
}

/// Serializable view of a record, as published in the status artifact.
///
/// Timestamps are epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub start_time: Option<f64>,
    pub restart_count: u32,
    pub last_restart: Option<f64>,
    pub command: String,
    pub priority: i32,
}

pub(crate) fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}
