//! Signal-driven shutdown and cleanup.
//!
//! SIGTERM and SIGINT cancel the supervisor's shutdown token. `run` blocks
//! on that token and then performs cleanup: cancel the publisher and the
//! monitors, force-stop everything in reverse priority order, and remove
//! the status artifact. Cleanup runs once no matter how many paths ask for
//! it.

use crate::cancel::CancellationToken;
use crate::error::{Result, SupervisorError};
use crate::process::ProcessState;
use crate::status::remove_status_file;
use crate::supervisor::Supervisor;
use futures::future::join_all;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Cancel `token` on the first SIGTERM or SIGINT.
///
/// Repeated signals collapse into the one cancellation. The returned task
/// ends once the token is cancelled by any means.
pub fn install_signal_handlers(token: CancellationToken) -> Result<JoinHandle<()>> {
    let listener = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| SupervisorError::Io {
            message: format!("Failed to install {name} handler: {e}"),
            path: None,
            source: Some(e),
        })
    };
    let mut terminate = listener(SignalKind::terminate(), "SIGTERM")?;
    let mut interrupt = listener(SignalKind::interrupt(), "SIGINT")?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
            _ = token.cancelled() => return,
        };
        if token.cancel() {
            info!("Received {}, initiating shutdown", received);
        } else {
            debug!("Received {} while already shutting down", received);
        }
    }))
}

impl Supervisor {
    /// Install signal handlers, then [`serve`](Self::serve).
    pub async fn run(&self) -> Result<()> {
        let signals = install_signal_handlers(self.inner.shutdown.clone())?;
        let result = self.serve().await;
        signals.abort();
        result
    }

    /// Publish status, bring up every registered process, and block until
    /// the shutdown token is cancelled; then clean up.
    ///
    /// Bring-up failures are logged and leave the supervisor running, so the
    /// failed processes stay visible in the status artifact.
    pub async fn serve(&self) -> Result<()> {
        info!("Supervisor starting");
        self.start_status_publisher().await;

        match self.start_all().await {
            Ok(()) => {}
            Err(SupervisorError::Cancelled) => debug!("Bring-up interrupted by shutdown"),
            Err(e) => error!("Bring-up incomplete: {}", e),
        }

        self.inner.shutdown.cancelled().await;
        info!("Shutdown requested");
        self.cleanup().await;
        Ok(())
    }

    /// Stop everything and remove the status artifact. Runs at most once;
    /// concurrent callers wait for the first to finish.
    pub async fn cleanup(&self) {
        self.inner
            .cleanup
            .get_or_init(|| async { self.cleanup_once().await })
            .await;
    }

    async fn cleanup_once(&self) {
        info!("Cleaning up supervisor...");
        self.inner.shutdown.cancel();

        // Nothing may race the forced stop below.
        self.stop_status_publisher().await;
        debug!("Waiting for {} monitor task(s)", self.inner.monitors.active());
        loop {
            let tasks = self.inner.monitors.drain();
            if tasks.is_empty() {
                break;
            }
            for result in join_all(tasks).await {
                if let Err(e) = result {
                    warn!("Monitor task ended abnormally: {}", e);
                }
            }
        }

        if let Err(e) = self.stop_all(true).await {
            error!("Failed to stop processes during cleanup: {}", e);
        }

        // A stop that timed out without force leaves a live process in `Stopping`.
        for entry in self.inner.registry.shutdown_order().await {
            let _guard = entry.op_lock.lock().await;
            if entry.state().await != ProcessState::Stopping {
                continue;
            }
            if let Err(e) = self.stop_locked(&entry, true).await {
                error!("Failed to stop process '{}' during cleanup: {}", entry.name(), e);
            }
        }

        if let Err(e) = remove_status_file(&self.inner.config.status_path) {
            warn!("Failed to remove status file: {}", e);
        }
        info!("Supervisor cleanup completed");
    }
}
