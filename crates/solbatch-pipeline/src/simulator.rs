//! Local chain simulator process

use crate::config::SimulatorSettings;
use crate::error::PipelineError;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running simulator; killed when dropped
#[derive(Debug)]
pub struct ChainSimulator {
    child: Child,
    port: u16,
}

impl ChainSimulator {
    /// Arguments passed to the simulator program
    #[must_use]
    pub fn arguments(settings: &SimulatorSettings, port: u16) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            port.to_string(),
            "--gasLimit".to_string(),
            settings.gas_limit.clone(),
        ];
        args.extend(
            settings
                .accounts
                .iter()
                .map(|key| format!("--account=0x{key},{}", settings.balance)),
        );
        args
    }

    /// Start the simulator on `port` and wait until it accepts connections
    ///
    /// # Errors
    /// Returns `PipelineError::Simulator` if the process cannot start, exits
    /// early, or does not open the port within the startup timeout.
    pub async fn start(settings: &SimulatorSettings, port: u16) -> Result<Self, PipelineError> {
        let child = Command::new(&settings.program)
            .args(Self::arguments(settings, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Simulator {
                port,
                reason: format!("cannot start {}: {e}", settings.program),
            })?;
        let mut simulator = Self { child, port };

        let deadline = Duration::from_millis(settings.startup_timeout_ms);
        let ready = tokio::time::timeout(deadline, simulator.wait_ready()).await;
        match ready {
            Ok(Ok(())) => {
                tracing::debug!(port, "chain simulator ready");
                Ok(simulator)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PipelineError::Simulator {
                port,
                reason: format!("port not open after {}ms", settings.startup_timeout_ms),
            }),
        }
    }

    async fn wait_ready(&mut self) -> Result<(), PipelineError> {
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(PipelineError::Simulator {
                    port: self.port,
                    reason: format!("exited early ({status})"),
                });
            }
            if TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Port the simulator listens on
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Terminate and reap the process
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(port = self.port, error = %e, "failed to stop chain simulator");
        }
    }
}
