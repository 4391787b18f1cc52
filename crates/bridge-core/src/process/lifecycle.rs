//! Start, stop and restart of a single process.
//!
//! The public operations take the entry's operation lock and delegate to the
//! `*_locked` variants, which the monitor and bulk paths call directly while
//! already holding that lock.

use super::launcher;
use super::registry::ProcessEntry;
use super::state::ProcessState;
use crate::config::SupervisorDefaults;
use crate::error::{Result, SupervisorError};
use crate::platform::{send_signal, StopSignal};
use crate::supervisor::Supervisor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before restart attempt number `restart_count + 1`.
///
/// `min(2^restart_count, 30)` units; never decreasing in `restart_count`.
pub fn backoff_delay(restart_count: u32, unit: Duration) -> Duration {
    let factor = 2u64
        .checked_pow(restart_count)
        .map_or(SupervisorDefaults::BACKOFF_CAP, |f| {
            f.min(SupervisorDefaults::BACKOFF_CAP)
        });
    unit.saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX))
}

/// Rolls a pre-spawn `Starting` back to `Stopped` when a start future is
/// dropped before it settles the record.
struct PendingStart<'a> {
    entry: &'a ProcessEntry,
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        // On contention the next `start` performs the rollback instead.
        if let Ok(mut record) = self.entry.record.try_write() {
            if record.state() == ProcessState::Starting {
                record.transition(self.entry.name(), ProcessState::Stopped);
            }
        }
    }
}

/// Result of polling one process's probe.
enum Health {
    Healthy,
    NotRunning,
    TimedOut,
}

impl Supervisor {
    /// Start a registered process.
    ///
    /// Starting a process that is already running (or starting) is a no-op.
    /// Dependencies must be registered, running and healthy first.
    pub async fn start(&self, name: &str) -> Result<()> {
        let entry = self.entry(name).await?;
        let _guard = entry.op_lock.lock().await;
        self.start_locked(&entry).await
    }

    /// Stop a process: SIGTERM, then wait up to its `stop_timeout`.
    ///
    /// With `force`, a process that outlives the grace period is killed.
    /// Without it, the timeout is returned as an error and the record stays
    /// `Stopping`. Returns `true` once the process is stopped, including when
    /// it already was.
    pub async fn stop(&self, name: &str, force: bool) -> Result<bool> {
        let entry = self.entry(name).await?;
        let _guard = entry.op_lock.lock().await;
        self.stop_locked(&entry, force).await
    }

    /// Force-stop, wait out the backoff delay, then start again.
    pub async fn restart(&self, name: &str) -> Result<bool> {
        let entry = self.entry(name).await?;
        let _guard = entry.op_lock.lock().await;
        self.restart_locked(&entry).await
    }

    /// Wait until every dependency of `name` passes its health probe.
    ///
    /// Each dependency gets its own `timeout`. A dependency without a probe
    /// counts as healthy; one that leaves `Running` fails the wait at once.
    pub async fn wait_for_dependencies_healthy(&self, name: &str, timeout: Duration) -> Result<()> {
        let entry = self.entry(name).await?;
        for dependency in &entry.config().dependencies {
            let dep_entry = self.inner.registry.get(dependency).await.ok_or_else(|| {
                SupervisorError::MissingDependency {
                    name: name.to_string(),
                    dependency: dependency.clone(),
                }
            })?;

            info!("Waiting for dependency '{}' of '{}' to become healthy", dependency, name);
            match self.poll_health(&dep_entry, timeout).await? {
                Health::Healthy => info!("Dependency '{}' is healthy", dependency),
                Health::NotRunning => {
                    return Err(SupervisorError::DependencyStopped {
                        name: name.to_string(),
                        dependency: dependency.clone(),
                    })
                }
                Health::TimedOut => {
                    return Err(SupervisorError::DependencyUnhealthy {
                        name: name.to_string(),
                        dependency: dependency.clone(),
                        timeout,
                    })
                }
            }
        }
        Ok(())
    }

    /// Wait until `name` itself passes its health probe.
    pub async fn wait_until_healthy(&self, name: &str, timeout: Duration) -> Result<()> {
        let entry = self.entry(name).await?;
        match self.poll_health(&entry, timeout).await? {
            Health::Healthy => Ok(()),
            Health::NotRunning => Err(SupervisorError::ProcessStopped {
                name: name.to_string(),
            }),
            Health::TimedOut => Err(SupervisorError::ProcessUnhealthy {
                name: name.to_string(),
                timeout,
            }),
        }
    }

    pub(crate) async fn start_locked(&self, entry: &Arc<ProcessEntry>) -> Result<()> {
        let name = entry.name();
        let config = entry.config().clone();

        let state = entry.state().await;
        match state {
            ProcessState::Running => {
                debug!("Process '{}' is already {}", name, state);
                return Ok(());
            }
            ProcessState::Starting => {
                // Under the lock, `Starting` is only left behind by a dropped start.
                warn!("Process '{}' was left starting by an interrupted start", name);
                entry.record.write().await.transition(name, ProcessState::Stopped);
            }
            ProcessState::Stopping => {
                return Err(SupervisorError::InvalidState {
                    name: name.to_string(),
                    state,
                });
            }
            ProcessState::Stopped | ProcessState::Failed | ProcessState::Backoff => {}
        }

        if let Err(err) = self.check_dependencies(entry).await {
            self.abandon_start(entry, &err).await;
            return Err(err);
        }
        if let Err(cancelled) = self.inner.shutdown.check() {
            let err = SupervisorError::from(cancelled);
            self.abandon_start(entry, &err).await;
            return Err(err);
        }

        entry.record.write().await.transition(name, ProcessState::Starting);
        let _pending = PendingStart {
            entry: entry.as_ref(),
        };

        if !config.start_delay.is_zero() {
            debug!("Delaying start of '{}' by {:?}", name, config.start_delay);
            if let Err(cancelled) = self.inner.shutdown.sleep(config.start_delay).await {
                entry.record.write().await.transition(name, ProcessState::Stopped);
                return Err(cancelled.into());
            }
        }

        info!("Starting process '{}': {}", name, config.command_line());
        match launcher::spawn_instance(&config, self.next_instance()) {
            Ok(handle) => {
                let pid = handle.pid();
                entry.record.write().await.attach(name, handle.clone());
                info!(process = %name, pid, "Process '{}' started with PID {}", name, pid);
                self.spawn_monitor(Arc::clone(entry), handle);
                Ok(())
            }
            Err(err) => {
                error!("Failed to start process '{}': {}", name, err);
                entry.record.write().await.transition(name, ProcessState::Failed);
                Err(err)
            }
        }
    }

    pub(crate) async fn stop_locked(&self, entry: &ProcessEntry, force: bool) -> Result<bool> {
        let name = entry.name();
        let stop_timeout = entry.config().stop_timeout;

        let handle = {
            let mut record = entry.record.write().await;
            if record.state() == ProcessState::Stopped {
                debug!("Process '{}' is already stopped", name);
                return Ok(true);
            }
            match record.handle().filter(|handle| !handle.has_exited()).cloned() {
                Some(handle) => {
                    if record.state() != ProcessState::Stopping {
                        record.transition(name, ProcessState::Stopping);
                    }
                    handle
                }
                None => {
                    debug!("Process '{}' has no live process; marking stopped", name);
                    record.transition(name, ProcessState::Stopped);
                    return Ok(true);
                }
            }
        };

        let pid = handle.pid();
        info!("Stopping process '{}' (PID {})", name, pid);
        signal(name, pid, StopSignal::Graceful)?;

        if let Ok(exit) = tokio::time::timeout(stop_timeout, handle.wait()).await {
            entry.record.write().await.transition(name, ProcessState::Stopped);
            info!(process = %name, %exit, "Process '{}' stopped gracefully", name);
            return Ok(true);
        }

        if !force {
            warn!("Process '{}' did not stop within {:?}", name, stop_timeout);
            return Err(SupervisorError::StopTimeout {
                name: name.to_string(),
                timeout: stop_timeout,
            });
        }

        warn!("Process '{}' did not stop within {:?}, killing it", name, stop_timeout);
        signal(name, pid, StopSignal::Kill)?;
        let exit = handle.wait().await;
        entry.record.write().await.transition(name, ProcessState::Stopped);
        info!(process = %name, %exit, "Process '{}' killed", name);
        Ok(true)
    }

    pub(crate) async fn restart_locked(&self, entry: &Arc<ProcessEntry>) -> Result<bool> {
        let name = entry.name();
        self.stop_locked(entry, true).await?;

        let delay = {
            let mut record = entry.record.write().await;
            let delay = backoff_delay(record.restart_count(), self.inner.config.backoff_unit);
            record.transition(name, ProcessState::Backoff);
            delay
        };

        info!("Restarting process '{}' in {:?}", name, delay);
        if let Err(cancelled) = self.inner.shutdown.sleep(delay).await {
            entry.record.write().await.transition(name, ProcessState::Stopped);
            return Err(cancelled.into());
        }

        entry.record.write().await.record_restart();
        self.start_locked(entry).await?;
        Ok(true)
    }

    /// Precondition check, then the health wait when dependencies exist.
    async fn check_dependencies(&self, entry: &ProcessEntry) -> Result<()> {
        let name = entry.name();
        let dependencies = &entry.config().dependencies;

        for dependency in dependencies {
            let dep_entry = self.inner.registry.get(dependency).await.ok_or_else(|| {
                SupervisorError::MissingDependency {
                    name: name.to_string(),
                    dependency: dependency.clone(),
                }
            })?;
            if dep_entry.state().await != ProcessState::Running {
                return Err(SupervisorError::DependencyNotRunning {
                    name: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
        }

        if !dependencies.is_empty() {
            self.wait_for_dependencies_healthy(name, self.inner.config.dependency_timeout)
                .await?;
        }
        Ok(())
    }

    /// Settle a start that failed before spawning.
    ///
    /// A plain `Stopped`/`Failed` record is left as it was. A record in
    /// `Backoff` belongs to a restart and is settled: `Stopped` if shutdown
    /// interrupted it, `Failed` otherwise.
    async fn abandon_start(&self, entry: &ProcessEntry, err: &SupervisorError) {
        let name = entry.name();
        let mut record = entry.record.write().await;
        if record.state() != ProcessState::Backoff {
            return;
        }
        if err.is_cancelled() {
            record.transition(name, ProcessState::Stopped);
        } else {
            error!("Restart of '{}' failed: {}", name, err);
            record.transition(name, ProcessState::Failed);
        }
    }

    async fn poll_health(&self, entry: &ProcessEntry, timeout: Duration) -> Result<Health> {
        let name = entry.name();
        let Some(probe) = entry.config().health_probe.clone() else {
            if entry.state().await != ProcessState::Running {
                return Ok(Health::NotRunning);
            }
            info!("No health probe for '{}', assuming healthy", name);
            return Ok(Health::Healthy);
        };

        let config = &self.inner.config;
        let rounds = config.poll_rounds(timeout);
        for round in 1..=rounds {
            let state = entry.state().await;
            if state != ProcessState::Running {
                warn!("Process '{}' is {} while waiting for it to become healthy", name, state);
                return Ok(Health::NotRunning);
            }

            match tokio::time::timeout(config.probe_timeout, probe.check()).await {
                Ok(Ok(true)) => return Ok(Health::Healthy),
                Ok(Ok(false)) => {}
                Ok(Err(e)) => warn!("Health probe '{}' for '{}' failed: {}", probe.describe(), name, e),
                Err(_) => warn!(
                    "Health probe '{}' for '{}' timed out after {:?}",
                    probe.describe(),
                    name,
                    config.probe_timeout
                ),
            }

            if round % SupervisorDefaults::HEALTH_LOG_EVERY == 0 {
                info!("Still waiting for '{}' to become healthy ({}/{})", name, round, rounds);
            }
            if round < rounds {
                self.inner.shutdown.sleep(config.health_poll_interval).await?;
            }
        }

        warn!("Process '{}' did not become healthy within {:?}", name, timeout);
        Ok(Health::TimedOut)
    }
}

/// Deliver `sig` to `pid`. A pid that is already gone is not an error.
fn signal(name: &str, pid: u32, sig: StopSignal) -> Result<()> {
    match send_signal(pid, sig) {
        Ok(true) => Ok(()),
        Ok(false) => {
            debug!("Process '{}' (PID {}) was already gone before {}", name, pid, sig);
            Ok(())
        }
        Err(e) => Err(SupervisorError::Signal {
            name: name.to_string(),
            pid,
            message: e.to_string(),
        }),
    }
}
