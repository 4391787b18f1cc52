//! Definitions of the two bridged processes.

use crate::probes::{interface_up_probe, tunnel_probe};
use anyhow::{bail, Context, Result};
use bridge_core::ProcessConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const OPENVPN: &str = "openvpn";
pub const WIREGUARD: &str = "wireguard";

/// Account OpenVPN drops privileges to.
const RUN_AS: &str = "bridge";

/// Options for the OpenVPN client.
#[derive(Debug, Clone)]
pub struct OpenVpnOptions {
    /// A config file, or a directory holding one.
    pub config: PathBuf,
    pub log_dir: PathBuf,
    /// `--verb` level, 0-9.
    pub log_level: Option<u8>,
    /// Extra whitespace-separated arguments.
    pub additional_args: Option<String>,
}

/// Options for the WireGuard endpoint.
#[derive(Debug, Clone)]
pub struct WireGuardOptions {
    pub interface: String,
    pub config_dir: PathBuf,
}

/// Resolve the OpenVPN config: a file is used as-is, a directory is searched
/// for the first `*.ovpn`, then the first `*.conf`.
pub fn resolve_openvpn_config(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        bail!("OpenVPN config {} does not exist", path.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    for extension in ["ovpn", "conf"] {
        if let Some(found) = files
            .iter()
            .find(|file| file.extension().is_some_and(|ext| ext == extension))
        {
            return Ok(found.clone());
        }
    }
    bail!("No OpenVPN configuration (.ovpn or .conf) found in {}", path.display())
}

/// OpenVPN client process.
///
/// OpenVPN is spawned directly, without `sudo`: the daemon is expected to
/// run as root (the container entrypoint), since creating the tun device
/// needs it. OpenVPN then drops to the `bridge` account after setup.
pub fn openvpn_process(options: &OpenVpnOptions, config_path: &Path) -> ProcessConfig {
    let log_file = options.log_dir.join("openvpn.log");

    let mut command = vec![
        "openvpn".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
        "--log".to_string(),
        log_file.display().to_string(),
    ];
    if let Some(level) = options.log_level {
        command.extend(["--verb".to_string(), level.to_string()]);
    }
    if let Some(ref extra) = options.additional_args {
        command.extend(extra.split_whitespace().map(str::to_string));
    }
    command.extend(["--user", RUN_AS, "--group", RUN_AS].map(str::to_string));

    ProcessConfig::new(OPENVPN, command)
        .with_auto_restart(true)
        .with_start_retries(3)
        .with_priority(100)
        .with_stop_timeout(Duration::from_secs(10))
        .with_health_probe(Arc::new(tunnel_probe()))
}

/// WireGuard endpoint, held up by the `run-wireguard` binary of this package.
/// Like OpenVPN it runs as the daemon's (root) user.
pub fn wireguard_process(options: &WireGuardOptions) -> ProcessConfig {
    let command = [
        "run-wireguard".to_string(),
        "--interface".to_string(),
        options.interface.clone(),
        "--config-dir".to_string(),
        options.config_dir.display().to_string(),
        "--verbose".to_string(),
    ];

    ProcessConfig::new(WIREGUARD, command)
        .with_auto_restart(true)
        .with_start_retries(3)
        .with_priority(200)
        // Interface teardown takes longer.
        .with_stop_timeout(Duration::from_secs(15))
        .with_dependency(OPENVPN)
        .with_health_probe(Arc::new(interface_up_probe(&options.interface)))
}
