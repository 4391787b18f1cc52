//! Shell-command health probes.

use async_trait::async_trait;
use bridge_core::{HealthProbe, Result, SupervisorError};
use std::fmt;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

type Predicate = Box<dyn Fn(&Output) -> bool + Send + Sync>;

/// Runs a command and judges readiness from its output.
pub struct CommandProbe {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    predicate: Predicate,
}

impl CommandProbe {
    /// Probe that is healthy when `program args...` exits successfully.
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: Duration::from_secs(3),
            predicate: Box::new(|output| output.status.success()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Additionally require the exit to be successful and stdout to contain `needle`.
    pub fn expecting_stdout(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        self.predicate = Box::new(move |output| {
            output.status.success() && String::from_utf8_lossy(&output.stdout).contains(&needle)
        });
        self
    }

    fn failure(&self, message: String) -> SupervisorError {
        SupervisorError::Probe {
            name: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn check(&self) -> Result<bool> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| self.failure(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.failure(format!("failed to run {}: {}", self.program, e)))?;

        let healthy = (self.predicate)(&output);
        if !healthy {
            debug!(
                probe = %self.name,
                status = %output.status,
                "Probe not satisfied: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(healthy)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Debug for CommandProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProbe")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `ip addr show type tun` lists a tun interface.
pub fn tunnel_probe() -> CommandProbe {
    CommandProbe::new("tun interface", "ip", ["addr", "show", "type", "tun"]).expecting_stdout("tun")
}

/// `ip addr show <interface>` succeeds and reports the link as up.
pub fn interface_up_probe(interface: &str) -> CommandProbe {
    CommandProbe::new(
        format!("{interface} interface"),
        "ip",
        ["addr", "show", interface],
    )
    .expecting_stdout("UP")
}
