//! Phased bring-up of the bridge.
//!
//! OpenVPN goes first and must have its tunnel up before WireGuard is even
//! registered; WireGuard then starts through the supervisor's normal
//! dependency-gated bring-up.

use crate::processes::{
    openvpn_process, resolve_openvpn_config, wireguard_process, OpenVpnOptions, WireGuardOptions,
    OPENVPN,
};
use anyhow::{Context, Result};
use bridge_core::shutdown::install_signal_handlers;
use bridge_core::{Supervisor, SupervisorError};
use tracing::{error, info, warn};

pub struct Bridge {
    supervisor: Supervisor,
    openvpn: OpenVpnOptions,
    wireguard: WireGuardOptions,
}

impl Bridge {
    pub fn new(supervisor: Supervisor, openvpn: OpenVpnOptions, wireguard: WireGuardOptions) -> Self {
        Self {
            supervisor,
            openvpn,
            wireguard,
        }
    }

    /// Bring the bridge up and supervise it until a termination signal.
    ///
    /// A failed bring-up stops whatever was started and returns the error.
    pub async fn run(&self) -> Result<()> {
        let signals = install_signal_handlers(self.supervisor.shutdown_token().clone())?;

        let result = match self.bring_up().await {
            Ok(()) => self.supervisor.serve().await.map_err(Into::into),
            Err(e) if is_cancelled(&e) => {
                info!("Shutdown requested during bring-up");
                self.supervisor.cleanup().await;
                Ok(())
            }
            Err(e) => {
                error!("WireGuard bridge failed: {:#}", e);
                self.supervisor.cleanup().await;
                Err(e)
            }
        };

        signals.abort();
        result
    }

    async fn bring_up(&self) -> Result<()> {
        info!("Phase 1: Starting OpenVPN...");
        let config_path = resolve_openvpn_config(&self.openvpn.config)?;
        info!("Using OpenVPN configuration {}", config_path.display());
        if let Err(e) = std::fs::create_dir_all(&self.openvpn.log_dir) {
            warn!("Could not create {}: {}", self.openvpn.log_dir.display(), e);
        }

        self.supervisor
            .register(openvpn_process(&self.openvpn, &config_path))
            .await?;
        self.supervisor
            .start(OPENVPN)
            .await
            .context("Failed to start OpenVPN process")?;

        info!("Waiting for OpenVPN tunnel to be established...");
        let timeout = self.supervisor.config().dependency_timeout;
        self.supervisor
            .wait_until_healthy(OPENVPN, timeout)
            .await
            .context("OpenVPN tunnel not established")?;
        info!("OpenVPN tunnel established");

        info!("Phase 2: Adding WireGuard process...");
        self.supervisor
            .register(wireguard_process(&self.wireguard))
            .await?;
        Ok(())
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SupervisorError>()
        .is_some_and(SupervisorError::is_cancelled)
}
