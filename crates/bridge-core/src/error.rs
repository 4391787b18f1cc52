//! Error types for the bridge supervisor.
//!
//! The variants follow the supervisor's failure classes: configuration
//! problems, dependency problems, spawn and stop failures, and the ambient
//! IO/JSON errors of the status artifact.

use crate::process::ProcessState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    // Configuration errors
    #[error("Process '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Process '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid configuration for '{name}': {message}")]
    Config { name: String, message: String },

    // Dependency errors
    #[error("Dependency '{dependency}' not found for process '{name}'")]
    MissingDependency { name: String, dependency: String },

    #[error("Dependency '{dependency}' is not running for process '{name}'")]
    DependencyNotRunning { name: String, dependency: String },

    #[error("Dependency '{dependency}' stopped unexpectedly while '{name}' was waiting")]
    DependencyStopped { name: String, dependency: String },

    #[error("Dependency '{dependency}' did not become healthy within {timeout:?}")]
    DependencyUnhealthy {
        name: String,
        dependency: String,
        timeout: Duration,
    },

    // Process errors
    #[error("Failed to spawn process '{name}': {message}")]
    Spawn {
        name: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to signal process '{name}' (PID {pid}): {message}")]
    Signal {
        name: String,
        pid: u32,
        message: String,
    },

    #[error("Process '{name}' cannot be started while {state}")]
    InvalidState { name: String, state: ProcessState },

    #[error("Process '{name}' did not stop within {timeout:?}")]
    StopTimeout { name: String, timeout: Duration },

    #[error("Process '{name}' did not become healthy within {timeout:?}")]
    ProcessUnhealthy { name: String, timeout: Duration },

    #[error("Process '{name}' is not running")]
    ProcessStopped { name: String },

    #[error("Health probe for '{name}' failed: {message}")]
    Probe { name: String, message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("{operation} failed for: {}", failures.join(", "))]
    BulkOperation {
        operation: &'static str,
        failures: Vec<String>,
    },

    // Status artifact errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

impl From<std::io::Error> for SupervisorError {
    fn from(err: std::io::Error) -> Self {
        SupervisorError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SupervisorError {
    fn from(err: serde_json::Error) -> Self {
        SupervisorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SupervisorError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SupervisorError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Rejected at registration or start time; never retried automatically.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::DuplicateName { .. }
                | SupervisorError::NotFound { .. }
                | SupervisorError::Config { .. }
        )
    }

    /// A dependency was missing, not running, or never became healthy.
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::MissingDependency { .. }
                | SupervisorError::DependencyNotRunning { .. }
                | SupervisorError::DependencyStopped { .. }
                | SupervisorError::DependencyUnhealthy { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SupervisorError::Cancelled)
    }
}
