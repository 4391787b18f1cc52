//! Holds a WireGuard interface up for the lifetime of this process.
//!
//! The supervisor manages WireGuard through this wrapper: it runs
//! `wg-quick up`, waits for SIGTERM/SIGINT, and runs `wg-quick down` before
//! exiting. The interface is taken down even when bring-up fails part way.

use anyhow::{bail, Context, Result};
use bridge_core::shutdown::install_signal_handlers;
use bridge_core::CancellationToken;
use clap::Parser;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "run-wireguard")]
#[command(about = "Run a WireGuard interface until terminated")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// WireGuard interface name
    #[arg(short, long, default_value = "wg0")]
    interface: String,

    /// Directory containing WireGuard configuration files
    #[arg(long, default_value = "/etc/wireguard")]
    config_dir: PathBuf,
}

/// Brings one interface up and down through `wg-quick`.
struct WireGuardRunner {
    interface: String,
    config_path: PathBuf,
    /// Program and leading arguments; `up`/`down` and the config follow.
    command: Vec<String>,
}

impl WireGuardRunner {
    fn new(interface: impl Into<String>, config_path: PathBuf) -> Self {
        Self {
            interface: interface.into(),
            config_path,
            command: vec!["wg-quick".to_string()],
        }
    }

    #[cfg(test)]
    fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Bring the interface up, hold it until `shutdown`, then bring it down.
    async fn run(&self, shutdown: &CancellationToken) -> Result<()> {
        info!("Bringing up WireGuard interface: {}", self.interface);
        let up = self.wg_quick("up").await;

        if up.is_ok() {
            info!("Monitoring WireGuard. Waiting for termination signal...");
            shutdown.cancelled().await;
        }

        info!("Gracefully shutting down WireGuard interface: {}", self.interface);
        let down = self.wg_quick("down").await;
        up?;
        down
    }

    async fn wg_quick(&self, action: &str) -> Result<()> {
        let Some((program, prefix)) = self.command.split_first() else {
            bail!("No wg-quick command configured");
        };
        let output = Command::new(program)
            .args(prefix)
            .arg(action)
            .arg(&self.config_path)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {program} {action}"))?;

        if !output.status.success() {
            bail!(
                "{} {} {} failed ({}): {}",
                program,
                action,
                self.interface,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = args.config_dir.join(format!("{}.conf", args.interface));
    if !config_path.is_file() {
        error!("WireGuard configuration not found: {}", config_path.display());
        std::process::exit(1);
    }
    info!("Using WireGuard interface: {}", args.interface);
    info!("Configuration file: {}", config_path.display());

    let shutdown = CancellationToken::new();
    let signals = install_signal_handlers(shutdown.clone())?;
    let result = WireGuardRunner::new(args.interface, config_path)
        .run(&shutdown)
        .await;
    signals.abort();

    if let Err(e) = &result {
        error!("WireGuard runner failed: {:#}", e);
    }
    result
}
