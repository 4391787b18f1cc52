//! Integration tests for the supervisor.
//!
//! These drive real `sh`/`sleep` children with millisecond timing knobs.

use bridge_core::platform::is_process_alive;
use bridge_core::status::read_status_file;
use bridge_core::{
    backoff_delay, FnProbe, ProcessConfig, ProcessState, Supervisor, SupervisorConfig,
    SupervisorError,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir) -> SupervisorConfig {
    SupervisorConfig::default()
        .with_status_path(temp_dir.path().join("process_status.json"))
        .with_status_interval(Duration::from_millis(20))
        .with_health_poll_interval(Duration::from_millis(10))
        .with_dependency_timeout(Duration::from_secs(2))
        .with_backoff_unit(Duration::from_millis(10))
}

/// A shell loop that appends `label` to `log` when asked to terminate.
fn logging_loop(name: &str, label: &str, log: &Path) -> ProcessConfig {
    let script = format!(
        "trap 'echo {label} >> {log}; exit 0' TERM; while :; do sleep 0.05; done",
        log = log.display()
    );
    ProcessConfig::new(name, ["sh", "-c", script.as_str()])
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

async fn wait_for_state(supervisor: &Supervisor, name: &str, state: ProcessState) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while supervisor.state(name).await != Some(state) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("'{name}' never reached {state}"));
}

#[tokio::test]
async fn test_duplicate_registration_keeps_first() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));

    supervisor
        .register(ProcessConfig::new("openvpn", ["sleep", "30"]).with_priority(100))
        .await
        .unwrap();
    let err = supervisor
        .register(ProcessConfig::new("openvpn", ["sleep", "60"]).with_priority(5))
        .await
        .unwrap_err();

    assert!(err.is_config_error());
    let status = supervisor.get_status("openvpn").await.unwrap();
    assert_eq!(status.command, "sleep 30");
    assert_eq!(status.priority, 100);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("sleeper", ["sleep", "30"]))
        .await
        .unwrap();

    supervisor.start("sleeper").await.unwrap();
    let pid = supervisor.get_status("sleeper").await.unwrap().pid;
    assert!(pid.is_some());

    supervisor.start("sleeper").await.unwrap();
    assert_eq!(supervisor.get_status("sleeper").await.unwrap().pid, pid);

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_concurrent_starts_spawn_once() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("sleeper", ["sleep", "30"]).with_start_delay(Duration::from_millis(50)))
        .await
        .unwrap();

    let (first, second) = tokio::join!(supervisor.start("sleeper"), supervisor.start("sleeper"));
    first.unwrap();
    second.unwrap();

    let status = supervisor.get_status("sleeper").await.unwrap();
    assert_eq!(status.state, ProcessState::Running);
    assert_eq!(status.restart_count, 0);

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_unregistered_dependency_blocks_start() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("wireguard", ["sleep", "30"]).with_dependency("openvpn"))
        .await
        .unwrap();

    let err = supervisor.start("wireguard").await.unwrap_err();
    assert!(err.is_dependency_error());
    let status = supervisor.get_status("wireguard").await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.pid, None);
}

#[test]
fn test_backoff_schedule() {
    let unit = Duration::from_secs(1);
    let delays: Vec<Duration> = (0..=5).map(|count| backoff_delay(count, unit)).collect();
    let expected: Vec<Duration> = [1, 2, 4, 8, 16, 30].into_iter().map(Duration::from_secs).collect();
    assert_eq!(delays, expected);
    assert_eq!(backoff_delay(40, unit), Duration::from_secs(30));
}

#[tokio::test]
async fn test_retry_exhaustion() {
    let temp_dir = TempDir::new().unwrap();
    let runs = temp_dir.path().join("runs.log");
    let supervisor = Supervisor::new(test_config(&temp_dir));

    let script = format!("echo run >> {}; exit 1", runs.display());
    supervisor
        .register(ProcessConfig::new("crasher", ["sh", "-c", script.as_str()]).with_start_retries(2))
        .await
        .unwrap();

    supervisor.start("crasher").await.unwrap();
    wait_for_state(&supervisor, "crasher", ProcessState::Failed).await;

    // Nothing further happens once the budget is spent.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = supervisor.get_status("crasher").await.unwrap();
    assert_eq!(status.state, ProcessState::Failed);
    assert_eq!(status.restart_count, 2);
    assert!(status.last_restart.is_some());
    assert_eq!(read_lines(&runs).len(), 3);
}

#[tokio::test]
async fn test_priority_ordering() {
    let temp_dir = TempDir::new().unwrap();
    let stops = temp_dir.path().join("stops.log");
    let supervisor = Supervisor::new(test_config(&temp_dir));

    for (name, priority) in [("A", 100), ("B", 200), ("C", 50)] {
        supervisor
            .register(logging_loop(name, name, &stops).with_priority(priority))
            .await
            .unwrap();
    }

    supervisor.start_all().await.unwrap();
    let all = supervisor.get_all_status().await;
    let started = |name: &str| all[name].start_time.unwrap();
    assert!(started("C") <= started("A"));
    assert!(started("A") <= started("B"));

    // Let the shells install their traps.
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.stop_all(false).await.unwrap();

    assert_eq!(read_lines(&stops), vec!["B", "A", "C"]);
    for name in ["A", "B", "C"] {
        assert_eq!(supervisor.state(name).await, Some(ProcessState::Stopped));
    }
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("idle", ["sleep", "30"]))
        .await
        .unwrap();

    // Never started: stopping is already satisfied.
    assert!(supervisor.stop("idle", false).await.unwrap());
    assert_eq!(supervisor.state("idle").await, Some(ProcessState::Stopped));

    supervisor.start("idle").await.unwrap();
    assert!(supervisor.stop("idle", false).await.unwrap());
    assert!(supervisor.stop("idle", false).await.unwrap());
    let status = supervisor.get_status("idle").await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.pid, None);
}

#[tokio::test]
async fn test_force_stop_escalation() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(
            ProcessConfig::new("stubborn", ["sh", "-c", "trap '' TERM; while :; do sleep 0.05; done"])
                .with_stop_timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap();
    supervisor.start("stubborn").await.unwrap();
    let pid = supervisor.get_status("stubborn").await.unwrap().pid.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = supervisor.stop("stubborn", false).await.unwrap_err();
    assert!(matches!(err, SupervisorError::StopTimeout { .. }));
    assert_eq!(supervisor.state("stubborn").await, Some(ProcessState::Stopping));
    assert!(is_process_alive(pid));

    assert!(supervisor.stop("stubborn", true).await.unwrap());
    let entry = supervisor.registry().get("stubborn").await.unwrap();
    let record = entry.record().await;
    assert_eq!(record.state(), ProcessState::Stopped);
    assert_eq!(record.pid(), None);
    assert_eq!(record.last_exit().and_then(|exit| exit.signal), Some(9));
}

#[tokio::test]
async fn test_start_refused_while_stopping() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(
            ProcessConfig::new("stubborn", ["sh", "-c", "trap '' TERM; while :; do sleep 0.05; done"])
                .with_stop_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    supervisor.start("stubborn").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(supervisor.stop("stubborn", false).await.is_err());

    let err = supervisor.start("stubborn").await.unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidState { .. }));

    supervisor.cleanup().await;
    assert_eq!(supervisor.state("stubborn").await, Some(ProcessState::Stopped));
}

#[tokio::test]
async fn test_status_file_reflects_running_process() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("openvpn", ["sleep", "30"]))
        .await
        .unwrap();
    supervisor.start("openvpn").await.unwrap();

    supervisor.publish_status().await.unwrap();
    let statuses = read_status_file(&supervisor.config().status_path)
        .unwrap()
        .unwrap();
    let status = &statuses["openvpn"];
    assert_eq!(status.state, ProcessState::Running);
    assert!(status.pid.is_some());
    assert_eq!(status.command, "sleep 30");

    let report = bridge_core::check_status_file(
        &supervisor.config().status_path,
        Duration::from_secs(15),
        &["openvpn"],
    );
    assert!(report.healthy, "{:?}", report.problems);

    supervisor.cleanup().await;
    assert!(!supervisor.config().status_path.exists());
}

#[tokio::test]
async fn test_dependency_waits_for_probe() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));

    let probe_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&probe_calls);
    let probe = FnProbe::new("always", move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    });

    supervisor
        .register(ProcessConfig::new("A", ["sleep", "30"]).with_health_probe(Arc::new(probe)))
        .await
        .unwrap();
    supervisor
        .register(
            ProcessConfig::new("B", ["sleep", "30"])
                .with_priority(200)
                .with_dependency("A"),
        )
        .await
        .unwrap();

    supervisor.start_all().await.unwrap();

    let all = supervisor.get_all_status().await;
    assert_eq!(all["A"].state, ProcessState::Running);
    assert_eq!(all["B"].state, ProcessState::Running);
    assert!(all["A"].start_time.unwrap() <= all["B"].start_time.unwrap());
    assert!(probe_calls.load(Ordering::SeqCst) >= 1);

    supervisor.cleanup().await;
}

#[tokio::test]
async fn test_dependency_stopping_fails_the_wait() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir).with_dependency_timeout(Duration::from_secs(5));
    let supervisor = Supervisor::new(config);

    supervisor
        .register(
            ProcessConfig::new("A", ["sleep", "30"])
                .with_auto_restart(false)
                .with_health_probe(Arc::new(FnProbe::new("never", || Ok(false)))),
        )
        .await
        .unwrap();
    supervisor
        .register(ProcessConfig::new("B", ["sleep", "30"]).with_dependency("A"))
        .await
        .unwrap();
    supervisor.start("A").await.unwrap();

    let starter = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.start("B").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.stop("A", true).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), starter)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(SupervisorError::DependencyStopped { .. })));
    assert_eq!(supervisor.state("B").await, Some(ProcessState::Stopped));
}

#[tokio::test]
async fn test_shutdown_cancels_backoff() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir).with_backoff_unit(Duration::from_secs(60));
    let supervisor = Supervisor::new(config);
    supervisor
        .register(ProcessConfig::new("crasher", ["sh", "-c", "exit 1"]))
        .await
        .unwrap();

    supervisor.start("crasher").await.unwrap();
    wait_for_state(&supervisor, "crasher", ProcessState::Backoff).await;

    tokio::time::timeout(Duration::from_secs(5), supervisor.cleanup())
        .await
        .expect("cleanup must not wait out the backoff");
    let status = supervisor.get_status("crasher").await.unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.restart_count, 0);
}

#[tokio::test]
async fn test_serve_publishes_and_cleans_up() {
    let temp_dir = TempDir::new().unwrap();
    let supervisor = Supervisor::new(test_config(&temp_dir));
    supervisor
        .register(ProcessConfig::new("A", ["sleep", "30"]))
        .await
        .unwrap();
    supervisor
        .register(ProcessConfig::new("B", ["sleep", "30"]).with_priority(200).with_dependency("A"))
        .await
        .unwrap();

    let server = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.serve().await })
    };

    let status_path = supervisor.config().status_path.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Some(statuses)) = read_status_file(&status_path) {
                if statuses.values().all(|status| status.state == ProcessState::Running)
                    && statuses.len() == 2
                {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    supervisor.shutdown_token().cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!status_path.exists());
    for name in ["A", "B"] {
        assert_eq!(supervisor.state(name).await, Some(ProcessState::Stopped));
    }
}
