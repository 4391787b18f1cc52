//! Exit monitors.
//!
//! One monitor task is spawned per started instance. It waits for the
//! instance to exit and then, under the entry's operation lock, decides
//! between an automatic restart and a terminal `Failed`.

use super::record::{ExitInfo, ProcessHandle};
use super::registry::ProcessEntry;
use super::state::ProcessState;
use crate::error::Result;
use crate::supervisor::Supervisor;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Join handles of the live monitor tasks.
#[derive(Debug, Default)]
pub(crate) struct MonitorSet {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorSet {
    pub(crate) fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Take every tracked task, leaving the set empty.
    pub(crate) fn drain(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tasks)
    }

    /// Number of monitors still running.
    pub(crate) fn active(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().filter(|task| !task.is_finished()).count()
    }
}

impl Supervisor {
    /// Spawn the monitor for a freshly attached instance.
    ///
    /// Kept synchronous so that the monitor future does not become part of
    /// the `start` future it is spawned from.
    pub(crate) fn spawn_monitor(&self, entry: Arc<ProcessEntry>, handle: ProcessHandle) {
        let supervisor = self.clone();
        let task = tokio::spawn(async move { supervisor.monitor(entry, handle).await });
        self.inner.monitors.track(task);
    }

    async fn monitor(self, entry: Arc<ProcessEntry>, handle: ProcessHandle) {
        let name = entry.name();
        let token = self.inner.shutdown.clone();

        let exit = tokio::select! {
            exit = handle.wait() => exit,
            _ = token.cancelled() => {
                debug!("Monitor for '{}' cancelled", name);
                return;
            }
        };

        if exit.success() {
            info!(process = %name, pid = handle.pid(), "Process '{}' exited with {}", name, exit);
        } else {
            warn!(process = %name, pid = handle.pid(), "Process '{}' exited with {}", name, exit);
        }

        let _guard = tokio::select! {
            guard = entry.op_lock.lock() => guard,
            _ = token.cancelled() => {
                debug!("Monitor for '{}' cancelled", name);
                return;
            }
        };

        match self.handle_exit(&entry, &handle, exit).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {
                debug!("Restart of '{}' interrupted by shutdown", name);
            }
            Err(err) => {
                error!("Error handling exit of '{}': {}", name, err);
                let mut record = entry.record.write().await;
                if record.state().can_transition_to(ProcessState::Failed) {
                    record.transition(name, ProcessState::Failed);
                }
            }
        }
    }

    async fn handle_exit(
        &self,
        entry: &Arc<ProcessEntry>,
        handle: &ProcessHandle,
        exit: ExitInfo,
    ) -> Result<()> {
        let name = entry.name();
        let config = entry.config();

        let restart_count = {
            let mut record = entry.record.write().await;
            if record.current_instance() != Some(handle.instance()) {
                // An explicit stop or restart already settled this instance.
                debug!("Ignoring exit of superseded instance of '{}'", name);
                return Ok(());
            }
            record.record_exit(exit);
            match record.state() {
                ProcessState::Running => record.restart_count(),
                ProcessState::Stopping => {
                    record.transition(name, ProcessState::Stopped);
                    return Ok(());
                }
                state => {
                    debug!("Process '{}' is {}; no action on exit", name, state);
                    return Ok(());
                }
            }
        };

        if config.auto_restart && restart_count < config.start_retries && !self.is_shutting_down() {
            info!(
                "Auto-restarting process '{}' (attempt {}/{})",
                name,
                restart_count + 1,
                config.start_retries
            );
            self.restart_locked(entry).await?;
        } else {
            error!("Process '{}' failed permanently or restart limit reached", name);
            entry.record.write().await.transition(name, ProcessState::Failed);
        }
        Ok(())
    }
}
