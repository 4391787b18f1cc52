//! Health probe capability.
//!
//! A probe answers "is this process functionally ready", which is a stronger
//! question than "is the OS process alive". Probes are supplied by whoever
//! registers the process; the supervisor only calls through [`HealthProbe`].

use crate::error::{Result, SupervisorError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A zero-argument readiness check.
///
/// Implementations must be safe to call repeatedly and should return within
/// a few seconds. The supervisor bounds every call with a timeout and treats
/// an error as "unhealthy this round".
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns `Ok(true)` when the process is ready.
    async fn check(&self) -> Result<bool>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String {
        "custom probe".to_string()
    }
}

/// Shared handle to a probe, as stored in a process configuration.
pub type SharedProbe = Arc<dyn HealthProbe>;

/// Adapter turning a synchronous closure into a [`HealthProbe`].
///
/// The closure runs on the blocking pool, so a closure that blocks is still
/// bounded by the supervisor's probe timeout.
pub struct FnProbe<F> {
    name: String,
    check: Arc<F>,
}

impl<F> FnProbe<F>
where
    F: Fn() -> Result<bool> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl<F> HealthProbe for FnProbe<F>
where
    F: Fn() -> Result<bool> + Send + Sync + 'static,
{
    async fn check(&self) -> Result<bool> {
        let check = Arc::clone(&self.check);
        tokio::task::spawn_blocking(move || (*check)())
            .await
            .map_err(|e| SupervisorError::Probe {
                name: self.name.clone(),
                message: format!("probe task failed: {e}"),
            })?
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnProbe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProbe").field("name", &self.name).finish()
    }
}
