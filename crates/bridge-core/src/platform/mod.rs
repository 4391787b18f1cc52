//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than in the
//! lifecycle code. The bridge runs inside a Linux container, so Unix is the
//! only fully supported target.

pub mod process;

pub use process::{is_process_alive, send_signal, StopSignal};
