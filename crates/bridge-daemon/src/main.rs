//! WireGuard Bridge - supervises an OpenVPN client and a WireGuard endpoint
//! running on top of it.
//!
//! In normal mode this binary brings OpenVPN up, waits for its tunnel, then
//! hands both processes to the supervisor until SIGTERM/SIGINT. With
//! `--health-check` it evaluates the status file written by a running
//! instance and exits 0 (healthy) or 1. `--restart <PROCESS>` asks a running
//! instance to restart one of its processes.

mod bridge;
mod control;
mod probes;
mod processes;

use anyhow::Result;
use bridge_core::{check_status_file, Supervisor, SupervisorConfig, SupervisorDefaults};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::bridge::Bridge;
use crate::processes::{OpenVpnOptions, WireGuardOptions, OPENVPN, WIREGUARD};

#[derive(Parser, Debug)]
#[command(name = "wireguard-bridge")]
#[command(about = "Bridge WireGuard clients through an OpenVPN tunnel")]
struct Args {
    /// WireGuard interface and configuration name
    #[arg(long, env = "CONFIG_NAME", default_value = "wg0")]
    config_name: String,

    /// Check the status file of a running bridge and exit
    #[arg(long)]
    health_check: bool,

    /// Restart a process of the running bridge (e.g. after a config change)
    #[arg(long, value_name = "PROCESS", conflicts_with = "health_check")]
    restart: Option<String>,

    /// OpenVPN client configuration file, or a directory containing one
    #[arg(long, env = "OPENVPN_CONFIG", default_value = "/etc/openvpn/config")]
    openvpn_config: PathBuf,

    /// OpenVPN verbosity (0-9)
    #[arg(long, env = "OPENVPN_LOG_LEVEL", value_parser = clap::value_parser!(u8).range(0..=9))]
    openvpn_log_level: Option<u8>,

    /// Extra arguments passed to OpenVPN
    #[arg(long, env = "OPENVPN_ADDITIONAL_ARGS", allow_hyphen_values = true)]
    openvpn_additional_args: Option<String>,

    /// Directory for the OpenVPN log file
    #[arg(long, env = "OPENVPN_LOG_DIR", default_value = "/var/log/openvpn")]
    openvpn_log_dir: PathBuf,

    /// Directory holding the WireGuard configuration
    #[arg(long, env = "WIREGUARD_CONFIG_DIR", default_value = "/etc/wireguard")]
    wireguard_config_dir: PathBuf,

    /// Status file path (defaults to /run/process_status.json)
    #[arg(long, env = "STATUS_FILE")]
    status_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

/// Evaluate the status file; true when both processes are running.
fn health_check(config: &SupervisorConfig) -> bool {
    let report = check_status_file(
        &config.status_path,
        SupervisorDefaults::STATUS_MAX_AGE,
        &[OPENVPN, WIREGUARD],
    );
    match serde_json::to_string(&report) {
        Ok(json) => debug!("Health report: {}", json),
        Err(e) => debug!("Could not serialize health report: {}", e),
    }
    for problem in &report.problems {
        error!("Health check failed: {}", problem);
    }
    report.healthy
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let mut config = SupervisorConfig::from_env();
    if let Some(path) = args.status_file {
        config = config.with_status_path(path);
    }

    if args.health_check {
        let healthy = health_check(&config);
        std::process::exit(if healthy { 0 } else { 1 });
    }

    if let Some(name) = args.restart.as_deref() {
        let outcome = control::request_restart(&config.status_path, name)?;
        info!("Restart of '{}' requested: {}", name, outcome);
        return Ok(());
    }

    info!("Starting WireGuard Bridge");
    info!("Status file: {}", config.status_path.display());

    let bridge = Bridge::new(
        Supervisor::new(config),
        OpenVpnOptions {
            config: args.openvpn_config,
            log_dir: args.openvpn_log_dir,
            log_level: args.openvpn_log_level,
            additional_args: args.openvpn_additional_args,
        },
        WireGuardOptions {
            interface: args.config_name,
            config_dir: args.wireguard_config_dir,
        },
    );
    bridge.run().await?;

    info!("WireGuard Bridge stopped");
    Ok(())
}
