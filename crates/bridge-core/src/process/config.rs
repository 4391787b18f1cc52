//! Immutable description of a managed process.

use crate::config::SupervisorDefaults;
use crate::error::{Result, SupervisorError};
use crate::probe::SharedProbe;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a managed process.
///
/// Built once by the caller and shared read-only with the supervisor after
/// registration.
#[derive(Clone)]
pub struct ProcessConfig {
    /// Unique process name.
    pub name: String,
    /// Executable followed by its arguments.
    pub command: Vec<String>,
    /// Working directory for the child.
    pub working_directory: Option<PathBuf>,
    /// Variables applied on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
    /// Restart automatically when the process exits.
    pub auto_restart: bool,
    /// Maximum number of automatic restarts.
    pub start_retries: u32,
    /// Lower starts first, higher stops first.
    pub priority: i32,
    /// Pause before spawning.
    pub start_delay: Duration,
    /// Grace period between SIGTERM and escalation.
    pub stop_timeout: Duration,
    /// Readiness check, consulted by dependents.
    pub health_probe: Option<SharedProbe>,
    /// Names that must be running and healthy before this process starts.
    pub dependencies: Vec<String>,
    /// Append child stdout/stderr to this file instead of inheriting them.
    pub log_file: Option<PathBuf>,
}

impl ProcessConfig {
    /// Create a config with default policy.
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            working_directory: None,
            environment: BTreeMap::new(),
            auto_restart: true,
            start_retries: SupervisorDefaults::START_RETRIES,
            priority: SupervisorDefaults::PRIORITY,
            start_delay: Duration::ZERO,
            stop_timeout: SupervisorDefaults::STOP_TIMEOUT,
            health_probe: None,
            dependencies: Vec::new(),
            log_file: None,
        }
    }

    pub fn with_working_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn with_start_retries(mut self, retries: u32) -> Self {
        self.start_retries = retries;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_health_probe(mut self, probe: SharedProbe) -> Self {
        self.health_probe = Some(probe);
        self
    }

    /// Add a dependency. Duplicates are ignored; order is preserved.
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// The command as a single display string.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Reject configurations that can never be started.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| SupervisorError::Config {
            name: self.name.clone(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.command.first().map_or(true, |exe| exe.is_empty()) {
            return Err(invalid("command must name an executable"));
        }
        if self.stop_timeout.is_zero() {
            return Err(invalid("stop_timeout must be positive"));
        }
        if self.dependencies.iter().any(|dep| dep == &self.name) {
            return Err(invalid("a process cannot depend on itself"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .field("auto_restart", &self.auto_restart)
            .field("start_retries", &self.start_retries)
            .field("priority", &self.priority)
            .field("start_delay", &self.start_delay)
            .field("stop_timeout", &self.stop_timeout)
            .field(
                "health_probe",
                &self.health_probe.as_ref().map(|probe| probe.describe()),
            )
            .field("dependencies", &self.dependencies)
            .field("log_file", &self.log_file)
            .finish()
    }
}
