//! The status artifact.
//!
//! The supervisor periodically serializes every record to a JSON file that
//! external health checks read. The file is written atomically: the snapshot
//! goes to a temp file in the same directory which is then renamed over the
//! target, so a reader sees either the previous or the new snapshot.

use crate::config::SupervisorDefaults;
use crate::error::{Result, SupervisorError};
use crate::process::{ProcessState, ProcessStatus};
use crate::supervisor::Supervisor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// Contents of the status artifact: process name to status.
pub type StatusMap = BTreeMap<String, ProcessStatus>;

/// Write `statuses` to `path` atomically.
pub fn write_status_file(path: &Path, statuses: &StatusMap) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| SupervisorError::io_with_path(e, parent))?;
    }

    let serialized = serde_json::to_string_pretty(statuses)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| SupervisorError::Io {
        message: format!("Failed to create temp file in {}", parent.display()),
        path: Some(parent.to_path_buf()),
        source: Some(e),
    })?;
    temp.write_all(serialized.as_bytes())
        .and_then(|()| set_status_permissions(temp.as_file()))
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| SupervisorError::Io {
            message: format!("Failed to write temp file {}", temp.path().display()),
            path: Some(temp.path().to_path_buf()),
            source: Some(e),
        })?;

    temp.persist(path).map_err(|e| SupervisorError::Io {
        message: format!("Failed to replace {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Wrote status file {}", path.display());
    Ok(())
}

// Temp files are created 0600 and `persist` keeps the mode.
#[cfg(unix)]
fn set_status_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(SupervisorDefaults::STATUS_FILE_MODE))
}

#[cfg(not(unix))]
fn set_status_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Read and parse the status artifact. `None` if it does not exist.
pub fn read_status_file(path: &Path) -> Result<Option<StatusMap>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SupervisorError::io_with_path(e, path)),
    };

    let statuses = serde_json::from_str(&contents).map_err(|e| SupervisorError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(statuses))
}

/// Delete the status artifact. A missing file is not an error.
pub fn remove_status_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed status file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SupervisorError::io_with_path(e, path)),
    }
}

/// Verdict of a status artifact check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    /// Age of the artifact, when it could be determined.
    pub age: Option<Duration>,
    /// Why the check failed; empty when healthy.
    pub problems: Vec<String>,
    pub processes: StatusMap,
}

/// Evaluate the status artifact as an external health check would.
///
/// Unhealthy when the file is missing, older than `max_age`, unparsable, or
/// when any `required` process is absent or not running.
pub fn check_status_file(path: &Path, max_age: Duration, required: &[&str]) -> HealthReport {
    let mut report = HealthReport {
        healthy: false,
        age: None,
        problems: Vec::new(),
        processes: StatusMap::new(),
    };

    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(_) => {
            report.problems.push(format!("status file {} not found", path.display()));
            return report;
        }
    };
    // A timestamp in the future counts as fresh.
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    report.age = Some(age);
    if age > max_age {
        report
            .problems
            .push(format!("status file is stale ({}s old)", age.as_secs()));
    }

    match read_status_file(path) {
        Ok(Some(processes)) => report.processes = processes,
        Ok(None) => report.problems.push("status file disappeared".to_string()),
        Err(e) => report.problems.push(e.to_string()),
    }

    if report.problems.is_empty() {
        for name in required {
            match report.processes.get(*name) {
                None => report.problems.push(format!("{name} is not registered")),
                Some(status) if status.state != ProcessState::Running => report
                    .problems
                    .push(format!("{name} is not running (state: {})", status.state)),
                Some(_) => {}
            }
        }
    }

    report.healthy = report.problems.is_empty();
    report
}

impl Supervisor {
    /// Write one snapshot of every record to the status artifact.
    pub async fn publish_status(&self) -> Result<()> {
        let snapshot = self.get_all_status().await;
        let path = self.inner.config.status_path.clone();
        tokio::task::spawn_blocking(move || write_status_file(&path, &snapshot))
            .await
            .map_err(|e| SupervisorError::Io {
                message: format!("Status writer task failed: {e}"),
                path: None,
                source: None,
            })?
    }

    /// Spawn the periodic publisher, once.
    pub(crate) async fn start_status_publisher(&self) {
        let mut slot = self.inner.publisher.lock().await;
        if slot.is_some() {
            return;
        }
        let supervisor = self.clone();
        *slot = Some(tokio::spawn(async move { supervisor.publish_loop().await }));
    }

    async fn publish_loop(self) {
        let token = self.inner.shutdown.clone();
        let interval = self.inner.config.status_interval;
        loop {
            if let Err(e) = self.publish_status().await {
                error!("Failed to write status file: {}", e);
            }
            if token.sleep(interval).await.is_err() {
                debug!("Status publisher stopped");
                break;
            }
        }
    }

    pub(crate) async fn stop_status_publisher(&self) {
        let task = self.inner.publisher.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Status publisher ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn status(name: &str, state: ProcessState) -> ProcessStatus {
        ProcessStatus {
            name: name.to_string(),
            state,
            pid: Some(100),
            start_time: Some(1_700_000_000.0),
            restart_count: 0,
            last_restart: None,
            command: name.to_string(),
            priority: 100,
        }
    }

    fn statuses(entries: &[(&str, ProcessState)]) -> StatusMap {
        entries
            .iter()
            .map(|(name, state)| (name.to_string(), status(name, *state)))
            .collect()
    }

    #[test]
    fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run").join("process_status.json");
        let data = statuses(&[("openvpn", ProcessState::Running)]);

        write_status_file(&path, &data).unwrap();
        assert_eq!(read_status_file(&path).unwrap(), Some(data));

        // No temp files are left behind.
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_status_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");
        write_status_file(&path, &statuses(&[("openvpn", ProcessState::Running)])).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");

        write_status_file(&path, &statuses(&[("openvpn", ProcessState::Starting)])).unwrap();
        write_status_file(&path, &statuses(&[("openvpn", ProcessState::Running)])).unwrap();

        let read = read_status_file(&path).unwrap().unwrap();
        assert_eq!(read["openvpn"].state, ProcessState::Running);
    }

    #[test]
    fn test_read_missing_and_remove_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.json");
        assert!(read_status_file(&path).unwrap().is_none());
        assert!(remove_status_file(&path).is_ok());
    }

    #[test]
    fn test_check_healthy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");
        let data = statuses(&[
            ("openvpn", ProcessState::Running),
            ("wireguard", ProcessState::Running),
        ]);
        write_status_file(&path, &data).unwrap();

        let report = check_status_file(&path, Duration::from_secs(15), &["openvpn", "wireguard"]);
        assert!(report.healthy, "{:?}", report.problems);
        assert!(report.age.is_some());
    }

    #[test]
    fn test_check_reports_problems() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");

        let missing = check_status_file(&path, Duration::from_secs(15), &["openvpn"]);
        assert!(!missing.healthy);

        write_status_file(&path, &statuses(&[("openvpn", ProcessState::Backoff)])).unwrap();
        let report = check_status_file(&path, Duration::from_secs(15), &["openvpn", "wireguard"]);
        assert!(!report.healthy);
        assert_eq!(report.problems.len(), 2);
        assert!(report.problems[0].contains("backoff"));
        assert!(report.problems[1].contains("wireguard"));
    }

    #[test]
    fn test_check_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");
        fs::write(&path, "not json").unwrap();

        let report = check_status_file(&path, Duration::from_secs(15), &[]);
        assert!(!report.healthy);
    }

    #[test]
    fn test_check_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("status.json");
        write_status_file(&path, &StatusMap::new()).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let report = check_status_file(&path, Duration::from_millis(1), &[]);
        assert!(!report.healthy);
        assert!(report.problems[0].contains("stale"));
    }
}
