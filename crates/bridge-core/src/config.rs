//! Centralized configuration for the supervisor.
//!
//! Constants live on [`SupervisorDefaults`]; the effective values for one
//! supervisor instance live on [`SupervisorConfig`].

use std::path::PathBuf;
use std::time::Duration;

/// Default values for supervisor timing and paths.
pub struct SupervisorDefaults;

impl SupervisorDefaults {
    pub const STATUS_FILE_ENV: &'static str = "STATUS_FILE";
    pub const STATUS_FILE: &'static str = "/run/process_status.json";
    pub const STATUS_INTERVAL: Duration = Duration::from_secs(5);
    pub const STATUS_MAX_AGE: Duration = Duration::from_secs(15);
    /// Readable by health checks running as another user.
    pub const STATUS_FILE_MODE: u32 = 0o644;

    // Dependency health polling
    pub const DEPENDENCY_TIMEOUT: Duration = Duration::from_secs(60);
    pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const HEALTH_LOG_EVERY: u32 = 10;

    // Restart backoff: min(2^restart_count, BACKOFF_CAP) * BACKOFF_UNIT
    pub const BACKOFF_UNIT: Duration = Duration::from_secs(1);
    pub const BACKOFF_CAP: u64 = 30;

    // Process defaults
    pub const START_RETRIES: u32 = 3;
    pub const PRIORITY: i32 = 100;
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Effective configuration of one supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Where the status artifact is written.
    pub status_path: PathBuf,
    /// Period of the status publisher.
    pub status_interval: Duration,
    /// How long a dependent waits for each dependency's probe.
    pub dependency_timeout: Duration,
    /// Pause between probe invocations.
    pub health_poll_interval: Duration,
    /// Upper bound on one probe invocation.
    pub probe_timeout: Duration,
    /// Unit multiplied by the backoff exponent.
    pub backoff_unit: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            status_path: PathBuf::from(SupervisorDefaults::STATUS_FILE),
            status_interval: SupervisorDefaults::STATUS_INTERVAL,
            dependency_timeout: SupervisorDefaults::DEPENDENCY_TIMEOUT,
            health_poll_interval: SupervisorDefaults::HEALTH_POLL_INTERVAL,
            probe_timeout: SupervisorDefaults::PROBE_TIMEOUT,
            backoff_unit: SupervisorDefaults::BACKOFF_UNIT,
        }
    }
}

impl SupervisorConfig {
    /// Defaults, with the status path taken from `STATUS_FILE` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = std::env::var_os(SupervisorDefaults::STATUS_FILE_ENV) {
            if !path.is_empty() {
                config.status_path = PathBuf::from(path);
            }
        }
        config
    }

    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = path.into();
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_dependency_timeout(mut self, timeout: Duration) -> Self {
        self.dependency_timeout = timeout;
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.health_poll_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Number of probe rounds that fit into `timeout`.
    pub(crate) fn poll_rounds(&self, timeout: Duration) -> u32 {
        if self.health_poll_interval.is_zero() {
            return 1;
        }
        let rounds = timeout.as_nanos() / self.health_poll_interval.as_nanos();
        u32::try_from(rounds).unwrap_or(u32::MAX).max(1)
    }
}
