//! Priority-ordered bring-up and tear-down.

use super::state::ProcessState;
use crate::error::{Result, SupervisorError};
use crate::supervisor::Supervisor;
use tracing::{error, info};

impl Supervisor {
    /// Start every process in ascending priority order.
    ///
    /// Best effort: a failure is logged and the loop moves on. Returns an
    /// error naming every process that failed to start.
    pub async fn start_all(&self) -> Result<()> {
        let mut failures = Vec::new();

        for entry in self.inner.registry.startup_order().await {
            let _guard = entry.op_lock.lock().await;
            if entry.state().await == ProcessState::Running {
                continue;
            }
            match self.start_locked(&entry).await {
                Ok(()) => {}
                Err(SupervisorError::Cancelled) => return Err(SupervisorError::Cancelled),
                Err(err) => {
                    error!("Failed to start process '{}': {}", entry.name(), err);
                    failures.push(entry.name().to_string());
                }
            }
        }

        if failures.is_empty() {
            info!("All processes started");
            Ok(())
        } else {
            Err(SupervisorError::BulkOperation {
                operation: "start_all",
                failures,
            })
        }
    }

    /// Stop every running process in descending priority order.
    pub async fn stop_all(&self, force: bool) -> Result<()> {
        let mut failures = Vec::new();

        for entry in self.inner.registry.shutdown_order().await {
            let _guard = entry.op_lock.lock().await;
            if entry.state().await != ProcessState::Running {
                continue;
            }
            if let Err(err) = self.stop_locked(&entry, force).await {
                error!("Failed to stop process '{}': {}", entry.name(), err);
                failures.push(entry.name().to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SupervisorError::BulkOperation {
                operation: "stop_all",
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::process::ProcessConfig;

    #[tokio::test]
    async fn test_start_all_is_best_effort() {
        let supervisor = Supervisor::new(SupervisorConfig::default());
        supervisor
            .register(ProcessConfig::new("broken", ["/nonexistent/bridge-binary"]).with_priority(10))
            .await
            .unwrap();
        supervisor
            .register(ProcessConfig::new("sleeper", ["sleep", "30"]).with_priority(20))
            .await
            .unwrap();

        let err = supervisor.start_all().await.unwrap_err();
        match err {
            SupervisorError::BulkOperation { operation, failures } => {
                assert_eq!(operation, "start_all");
                assert_eq!(failures, vec!["broken".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(supervisor.state("sleeper").await, Some(ProcessState::Running));

        supervisor.stop_all(true).await.unwrap();
        assert_eq!(supervisor.state("sleeper").await, Some(ProcessState::Stopped));
        // Only running processes are stopped.
        assert_eq!(supervisor.state("broken").await, Some(ProcessState::Failed));
    }

    #[tokio::test]
    async fn test_start_all_skips_running() {
        let supervisor = Supervisor::new(SupervisorConfig::default());
        supervisor
            .register(ProcessConfig::new("sleeper", ["sleep", "30"]))
            .await
            .unwrap();

        supervisor.start_all().await.unwrap();
        let pid = supervisor.get_status("sleeper").await.unwrap().pid;
        supervisor.start_all().await.unwrap();
        assert_eq!(supervisor.get_status("sleeper").await.unwrap().pid, pid);

        supervisor.stop_all(true).await.unwrap();
    }
}
