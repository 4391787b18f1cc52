//! Out-of-process control of a running bridge.
//!
//! The status file is the only interface a running bridge exposes. To
//! restart one of its processes, terminate the instance recorded there;
//! the supervisor observes the exit and brings it back through its normal
//! auto-restart path.

use anyhow::{anyhow, bail, Context, Result};
use bridge_core::platform::{is_process_alive, send_signal, StopSignal};
use bridge_core::status::read_status_file;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// What [`request_restart`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// SIGTERM was delivered to this PID.
    Signalled(u32),
    /// The recorded PID had already exited.
    AlreadyGone(u32),
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartOutcome::Signalled(pid) => write!(f, "sent SIGTERM to PID {pid}"),
            RestartOutcome::AlreadyGone(pid) => write!(f, "PID {pid} had already exited"),
        }
    }
}

/// Ask the bridge publishing `status_path` to restart process `name`.
pub fn request_restart(status_path: &Path, name: &str) -> Result<RestartOutcome> {
    let statuses = read_status_file(status_path)?.ok_or_else(|| {
        anyhow!(
            "Process status file {} not found; is the bridge running?",
            status_path.display()
        )
    })?;

    let pid = statuses
        .get(name)
        .and_then(|status| status.pid)
        .ok_or_else(|| anyhow!("Process '{}' has no running instance in the status file", name))?;

    if !is_process_alive(pid) {
        warn!("Process '{}' (PID {}) not found; it might have already exited", name, pid);
        return Ok(RestartOutcome::AlreadyGone(pid));
    }

    let delivered = send_signal(pid, StopSignal::Graceful)
        .with_context(|| format!("Failed to restart process '{name}' (PID {pid})"))?;
    if !delivered {
        warn!("Process '{}' (PID {}) exited before it could be signalled", name, pid);
        return Ok(RestartOutcome::AlreadyGone(pid));
    }

    info!("Sent SIGTERM to '{}' (PID {}); it should restart automatically", name, pid);
    Ok(RestartOutcome::Signalled(pid))
}
