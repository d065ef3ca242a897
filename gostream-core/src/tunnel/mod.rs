// Tunnel supervision
//
// The tunnel is opt-in: its configuration file must exist and the user has to
// consent before the client runs. Toggling it never touches the media engine
// or the edge server.

mod frpc;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub use frpc::FrpcClient;

use crate::config::TunnelConfig;
use crate::error::{Error, Result};
use crate::events::{Notice, Prompt, ServiceEvent, ServiceStatus, Shell};
use crate::state::{Activation, Service, Shared};

/// Client exposing local services through a public relay.
#[async_trait]
pub trait TunnelClient: Send + Sync + 'static {
    /// Run until the client exits on its own or `cancel` fires.
    async fn run(&self, config_path: &Path, cancel: CancellationToken) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    Started,
    AlreadyRunning,
    /// The user did not consent.
    Declined,
    Stopped,
    NotRunning,
}

#[derive(Clone)]
pub struct TunnelSupervisor {
    config: TunnelConfig,
    client: Arc<dyn TunnelClient>,
    shared: Arc<Shared>,
    shell: Arc<dyn Shell>,
    tracker: TaskTracker,
    /// Serializes start requests so only one consent dialog is ever open.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl TunnelSupervisor {
    pub fn new(
        config: TunnelConfig,
        client: Arc<dyn TunnelClient>,
        shared: Arc<Shared>,
        shell: Arc<dyn Shell>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            config,
            client,
            shared,
            shell,
            tracker,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Stop the tunnel if it runs, otherwise go through the start checks.
    pub async fn toggle(&self) -> Result<TunnelOutcome> {
        let _gate = self.gate.lock().await;
        if self.shared.lock().tunnel.is_live() {
            Ok(self.stop())
        } else {
            self.start_gated().await
        }
    }

    pub async fn start(&self) -> Result<TunnelOutcome> {
        let _gate = self.gate.lock().await;
        self.start_gated().await
    }

    /// Cancel the running client. Idempotent.
    pub fn stop(&self) -> TunnelOutcome {
        if self.shared.lock().tunnel.cancel() {
            info!("Stopping tunnel service");
            TunnelOutcome::Stopped
        } else {
            TunnelOutcome::NotRunning
        }
    }

    async fn start_gated(&self) -> Result<TunnelOutcome> {
        if self.shared.lock().tunnel.is_live() {
            return Ok(TunnelOutcome::AlreadyRunning);
        }

        let path = &self.config.config_path;
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(path = %path.display(), "Tunnel configuration not found, tunnel will not start");
            if let Err(e) = self.shell.notify(Notice::tunnel_config_missing(path)).await {
                warn!(error = %e, "Failed to show missing configuration notice");
            }
            return Err(Error::ConfigMissing(path.clone()));
        }

        match self.shell.confirm(Prompt::tunnel_consent()).await {
            Ok(true) => {}
            Ok(false) => {
                info!("User chose not to start the tunnel");
                return Ok(TunnelOutcome::Declined);
            }
            Err(e) => {
                error!(error = %e, "Consent dialog failed");
                return Err(e);
            }
        }

        let activation = {
            let mut state = self.shared.lock();
            if state.shutting_down {
                info!("Shutdown in progress, tunnel not started");
                return Ok(TunnelOutcome::Declined);
            }
            state.tunnel.begin()
        };
        let Some(activation) = activation else {
            return Ok(TunnelOutcome::AlreadyRunning);
        };

        let this = self.clone();
        self.tracker.spawn(async move { this.run(activation).await });
        Ok(TunnelOutcome::Started)
    }

    async fn run(self, activation: Activation) {
        info!("Starting tunnel service");
        self.shared.lock().tunnel.mark_running(activation.generation);
        self.shell.emit(ServiceEvent::status(
            Service::Tunnel.name(),
            ServiceStatus::Running,
        ));

        let result = self
            .client
            .run(&self.config.config_path, activation.token.clone())
            .await;
        match result {
            Ok(()) if activation.token.is_cancelled() => info!("Tunnel client stopped"),
            Ok(()) => info!("Tunnel client exited"),
            Err(e) => {
                error!(error = %e, "Tunnel client failed");
                self.shell.emit(ServiceEvent::log(
                    Service::Tunnel.name(),
                    format!("Tunnel error: {e:#}"),
                ));
            }
        }

        // Clears the token too when the client ended on its own, so the
        // next toggle starts a fresh activation.
        self.shared.lock().tunnel.finish(activation.generation);
        self.shell.emit(ServiceEvent::status(
            Service::Tunnel.name(),
            ServiceStatus::Stopped,
        ));
    }
}
