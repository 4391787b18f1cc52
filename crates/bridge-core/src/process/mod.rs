//! Process supervision.
//!
//! A process is described once by a [`ProcessConfig`], registered into the
//! [`Registry`], and from then on driven through the [`ProcessState`] machine
//! by the lifecycle operations on [`crate::Supervisor`].
//!
//! # Concurrency
//!
//! Every lifecycle operation (`start`, `stop`, `restart`, and the monitor's
//! exit handling) holds the target entry's operation lock for its whole
//! critical section, so two operations on the same name never interleave at
//! an `.await`. Record data sits behind a separate short-lived lock so that
//! status snapshots never wait for a long backoff.
//!
//! Exit is observed through a reaper task that owns the OS child and
//! publishes [`ExitInfo`] on a watch channel; `stop` and the monitor both read
//! that channel, which is how an explicit stop and an exit observation agree
//! on a single terminal transition.

mod bulk;
mod config;
mod launcher;
mod lifecycle;
mod monitor;
mod record;
mod registry;
mod state;

pub use config::ProcessConfig;
pub use lifecycle::backoff_delay;
pub use record::{ExitInfo, ProcessRecord, ProcessStatus};
pub use registry::{ProcessEntry, Registry};
pub use state::ProcessState;

pub(crate) use monitor::MonitorSet;
