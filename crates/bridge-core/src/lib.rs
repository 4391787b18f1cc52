//! Bridge Core - process supervision for the WireGuard-over-OpenVPN bridge.
//!
//! This crate keeps a small set of interdependent long-running processes
//! alive: dependency-gated startup behind health probes, bounded automatic
//! restarts with exponential backoff, priority-ordered bulk start/stop,
//! a periodically published status file, and signal-driven cleanup.
//!
//! What the processes are (the VPN client, the tunnel endpoint, their probes)
//! is decided by the caller; see the `bridge-daemon` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use bridge_core::{ProcessConfig, Supervisor, SupervisorConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> bridge_core::Result<()> {
//!     let supervisor = Supervisor::new(SupervisorConfig::from_env());
//!
//!     supervisor
//!         .register(ProcessConfig::new("openvpn", ["openvpn", "--config", "client.ovpn"]))
//!         .await?;
//!     supervisor
//!         .register(
//!             ProcessConfig::new("wireguard", ["run-wireguard", "--interface", "wg0"])
//!                 .with_priority(200)
//!                 .with_dependency("openvpn"),
//!         )
//!         .await?;
//!
//!     // Starts both in priority order, then blocks until SIGTERM/SIGINT.
//!     supervisor.run().await
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod platform;
pub mod probe;
pub mod process;
pub mod shutdown;
pub mod status;

mod supervisor;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::{SupervisorConfig, SupervisorDefaults};
pub use error::{Result, SupervisorError};
pub use probe::{FnProbe, HealthProbe, SharedProbe};
pub use process::{
    backoff_delay, ExitInfo, ProcessConfig, ProcessRecord, ProcessState, ProcessStatus,
};
pub use status::{check_status_file, HealthReport, StatusMap};
pub use supervisor::Supervisor;
