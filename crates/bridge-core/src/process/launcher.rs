//! Spawning a configured process and reaping it.

use super::config::ProcessConfig;
use super::record::{ExitInfo, ProcessHandle};
use crate::error::{Result, SupervisorError};
use std::fs::OpenOptions;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Build the OS command for `config`.
fn build_command(config: &ProcessConfig) -> Result<Command> {
    let spawn_error = |message: String, source: Option<std::io::Error>| SupervisorError::Spawn {
        name: config.name.clone(),
        message,
        source,
    };

    let (program, args) = config
        .command
        .split_first()
        .ok_or_else(|| spawn_error("empty command".to_string(), None))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.envs(&config.environment);
    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::null());
    if let Some(ref log_file) = config.log_file {
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| spawn_error(format!("open log file {}", log_file.display()), Some(e)))?;
        let stderr_file = file
            .try_clone()
            .map_err(|e| spawn_error("clone log file handle".to_string(), Some(e)))?;
        cmd.stdout(Stdio::from(file));
        cmd.stderr(Stdio::from(stderr_file));
    } else {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }

    // The reaper owns the child; dropping it must not kill the process.
    cmd.kill_on_drop(false);
    Ok(cmd)
}

/// Spawn one instance of `config` and start its reaper.
pub(crate) fn spawn_instance(config: &ProcessConfig, instance: u64) -> Result<ProcessHandle> {
    let mut cmd = build_command(config)?;
    let mut child = cmd.spawn().map_err(|e| SupervisorError::Spawn {
        name: config.name.clone(),
        message: e.to_string(),
        source: Some(e),
    })?;

    let Some(pid) = child.id() else {
        // Only possible if the child was already reaped, which nothing has done yet.
        let _ = child.start_kill();
        return Err(SupervisorError::Spawn {
            name: config.name.clone(),
            message: "spawned process has no PID".to_string(),
            source: None,
        });
    };

    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(reap(config.name.clone(), pid, child, exit_tx));

    Ok(ProcessHandle::new(instance, pid, exit_rx))
}

/// Wait for the child to exit and publish its status.
///
/// Never cancelled: exit must be observable by `stop` even during shutdown.
async fn reap(name: String, pid: u32, mut child: Child, exit_tx: watch::Sender<Option<ExitInfo>>) {
    let exit = match child.wait().await {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            warn!("Failed to collect exit status of '{}' (PID {}): {}", name, pid, e);
            ExitInfo::unknown()
        }
    };
    debug!(process = %name, pid, %exit, "Reaped process");
    exit_tx.send_replace(Some(exit));
}
