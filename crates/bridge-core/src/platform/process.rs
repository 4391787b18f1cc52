//! Platform-specific process signalling.
//!
//! The supervisor never blocks on a pid here; exit is observed through the
//! reaper task that owns the child. These helpers only deliver signals and
//! answer liveness questions.

use std::io;
use tracing::{debug, warn};

/// Which termination signal to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM: ask the process to exit.
    Graceful,
    /// SIGKILL: cannot be caught or ignored.
    Kill,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopSignal::Graceful => write!(f, "SIGTERM"),
            StopSignal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Check if a process with the given PID is alive.
///
/// Uses `kill(pid, 0)`, which performs the permission and existence checks
/// without delivering anything. A zombie still counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // The process exists but belongs to someone else.
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        warn!("Process alive check not implemented for this platform (pid {})", pid);
        true
    }
}

/// Deliver `signal` to `pid`.
///
/// Returns `Ok(false)` if the process no longer exists, which callers treat
/// as "already exited".
pub fn send_signal(pid: u32, signal: StopSignal) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("PID {pid} out of range"))
        })?;
        if raw <= 0 {
            // 0 and negative values address process groups.
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to signal PID {pid}"),
            ));
        }

        let nix_signal = match signal {
            StopSignal::Graceful => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };

        debug!("Sending {} to process {}", signal, pid);
        match kill(Pid::from_raw(raw), nix_signal) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::ESRCH) => {
                debug!("Process {} already gone", pid);
                Ok(false)
            }
            Err(e) => {
                warn!("Failed to send {} to {}: {}", signal, pid, e);
                Err(io::Error::from(e))
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process signalling not implemented for this platform",
        ))
    }
}
