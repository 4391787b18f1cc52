//! The supervisor facade.
//!
//! [`Supervisor`] is a cheap, cloneable handle over the shared registry,
//! configuration and shutdown token. Lifecycle operations live in
//! `process::lifecycle`, bulk operations in `process::bulk`, and the run loop
//! and cleanup in [`crate::shutdown`].

use crate::cancel::CancellationToken;
use crate::config::SupervisorConfig;
use crate::error::{Result, SupervisorError};
use crate::process::{MonitorSet, ProcessConfig, ProcessEntry, ProcessState, ProcessStatus, Registry};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;

/// Supervises a set of named processes.
///
/// # Example
///
/// ```no_run
/// use bridge_core::{ProcessConfig, Supervisor, SupervisorConfig};
///
/// # async fn example() -> bridge_core::Result<()> {
/// let supervisor = Supervisor::new(SupervisorConfig::from_env());
/// supervisor
///     .register(ProcessConfig::new("openvpn", ["openvpn", "--config", "client.ovpn"]))
///     .await?;
/// supervisor.start("openvpn").await?;
/// supervisor.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Supervisor {
    pub(crate) inner: Arc<SupervisorInner>,
}

#[derive(Debug)]
pub(crate) struct SupervisorInner {
    pub(crate) config: SupervisorConfig,
    pub(crate) registry: Registry,
    pub(crate) shutdown: CancellationToken,
    pub(crate) monitors: MonitorSet,
    pub(crate) publisher: Mutex<Option<JoinHandle<()>>>,
    pub(crate) cleanup: OnceCell<()>,
    next_instance: AtomicU64,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_shutdown_token(config, CancellationToken::new())
    }

    /// Create a supervisor driven by an externally owned shutdown token.
    pub fn with_shutdown_token(config: SupervisorConfig, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                registry: Registry::new(),
                shutdown,
                monitors: MonitorSet::default(),
                publisher: Mutex::new(None),
                cleanup: OnceCell::new(),
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// The token that ends `run` and cancels every suspension point.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Register a process. See [`Registry::register`].
    pub async fn register(&self, config: ProcessConfig) -> Result<()> {
        self.inner.registry.register(config).await
    }

    pub async fn get_status(&self, name: &str) -> Option<ProcessStatus> {
        let entry = self.inner.registry.get(name).await?;
        Some(entry.status().await)
    }

    /// Status of every registered process, keyed by name.
    pub async fn get_all_status(&self) -> BTreeMap<String, ProcessStatus> {
        self.inner
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|status| (status.name.clone(), status))
            .collect()
    }

    pub async fn state(&self, name: &str) -> Option<ProcessState> {
        let entry = self.inner.registry.get(name).await?;
        Some(entry.state().await)
    }

    pub(crate) async fn entry(&self, name: &str) -> Result<Arc<ProcessEntry>> {
        self.inner
            .registry
            .get(name)
            .await
            .ok_or_else(|| SupervisorError::NotFound {
                name: name.to_string(),
            })
    }

    pub(crate) fn next_instance(&self) -> u64 {
        self.inner.next_instance.fetch_add(1, Ordering::Relaxed)
    }
}
