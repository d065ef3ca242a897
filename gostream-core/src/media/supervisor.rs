use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::registry::{ListenerRegistry, RegisteredListener};
use super::{BoxSubServer, MediaEngine, SubServerKind};
use crate::config::MediaConfig;
use crate::error::{Error, Result};
use crate::events::{ServiceEvent, ServiceStatus, Shell};
use crate::state::{Activation, Service, Shared};

/// Runs the media engine's sub-servers under one cancellation token.
#[derive(Clone)]
pub struct MediaSupervisor {
    config: MediaConfig,
    engine: Arc<dyn MediaEngine>,
    shared: Arc<Shared>,
    registry: ListenerRegistry,
    shell: Arc<dyn Shell>,
    tracker: TaskTracker,
}

impl MediaSupervisor {
    pub fn new(
        config: MediaConfig,
        engine: Arc<dyn MediaEngine>,
        shared: Arc<Shared>,
        registry: ListenerRegistry,
        shell: Arc<dyn Shell>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            config,
            engine,
            shared,
            registry,
            shell,
            tracker,
        }
    }

    /// Start the engine in the background. No-op if it is already running.
    pub fn start(&self) -> bool {
        let mut state = self.shared.lock();
        let Some(activation) = state.media.begin() else {
            info!("Media services already running");
            return false;
        };

        let this = self.clone();
        state.media_task = Some(self.tracker.spawn(async move { this.run(activation).await }));
        true
    }

    /// Cancel the running activation and close its listeners.
    ///
    /// Returns once the media ports are released and the run task is done.
    pub async fn stop(&self) {
        let task = {
            let mut state = self.shared.lock();
            if state.media.cancel() {
                info!("Stopping media services");
            }
            state.media_task.take()
        };

        let closed = self.registry.close_all().await;
        if closed > 0 {
            debug!(closed, "Closed media listeners");
        }

        // Listeners bound after close_all are refused and released by the
        // run task itself.
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Media run task ended abnormally");
            }
        }
    }

    async fn run(self, activation: Activation) {
        info!("Starting media services");
        self.shared.lock().media.mark_running(activation.generation);
        self.emit_status(Service::Media.name(), ServiceStatus::Running);

        // A failed bind aborts the remaining startup, but whatever already
        // opened stays registered until the token fires.
        if let Err(e) = self.launch_all(&activation.token).await {
            error!(error = %e, "Media services startup aborted");
            self.shell.emit(ServiceEvent::log(
                Service::Media.name(),
                format!("Startup failed: {e}"),
            ));
        }

        activation.token.cancelled().await;
        info!("Media services stopped");
        self.shared.lock().media.finish(activation.generation);
        self.emit_status(Service::Media.name(), ServiceStatus::Stopped);
    }

    async fn launch_all(&self, token: &CancellationToken) -> Result<()> {
        let (hls, sink) = self.engine.hls_server();
        self.launch(SubServerKind::Hls, &self.config.hls_address, hls, token)
            .await?;

        self.launch(
            SubServerKind::Flv,
            &self.config.flv_address,
            self.engine.flv_server(),
            token,
        )
        .await?;

        if self.config.api_address.is_empty() {
            debug!("Control API disabled");
        } else {
            self.launch(
                SubServerKind::Api,
                &self.config.api_address,
                self.engine.api_server(),
                token,
            )
            .await?;
        }

        // Ingest goes last, once HLS is being served.
        let ingest = self.engine.ingest_server(sink);
        self.launch(SubServerKind::Ingest, &self.config.ingest_address, ingest, token)
            .await
    }

    async fn launch(
        &self,
        kind: SubServerKind,
        address: &str,
        server: BoxSubServer,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Ok(());
        }

        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| Error::Bind {
                service: kind.name(),
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let task = tokio::spawn(server.serve(listener));
        let released = CancellationToken::new();
        let registered =
            RegisteredListener::new(kind, local_addr, task.abort_handle(), released.clone());
        if !self.registry.register(registered, token) {
            let _ = task.await;
            released.cancel();
            return Ok(());
        }

        info!(server = %kind, addr = %local_addr, "Sub-server listening");
        self.emit_status(kind.name(), ServiceStatus::Running);

        let shell = Arc::clone(&self.shell);
        self.tracker
            .spawn(async move { watch_sub_server(kind, task, released, shell).await });
        Ok(())
    }

    fn emit_status(&self, service: &str, status: ServiceStatus) {
        self.shell.emit(ServiceEvent::status(service, status));
    }
}

/// Wait for a sub-server task and report how it ended.
///
/// A panic stays inside the sub-server's task; it is reported and the rest
/// of the process carries on.
async fn watch_sub_server(
    kind: SubServerKind,
    task: JoinHandle<anyhow::Result<()>>,
    released: CancellationToken,
    shell: Arc<dyn Shell>,
) {
    let outcome = task.await;
    released.cancel();
    match outcome {
        Ok(Ok(())) => info!(server = %kind, "Sub-server exited"),
        Ok(Err(e)) => {
            error!(server = %kind, error = %e, "Sub-server failed");
            shell.emit(ServiceEvent::log(kind.name(), format!("Server error: {e:#}")));
        }
        Err(e) if e.is_cancelled() => debug!(server = %kind, "Listener closed"),
        Err(e) => {
            let err = Error::SubServerPanic(kind.name());
            error!(server = %kind, error = %err, detail = %e, "Recovered from panic");
            shell.emit(ServiceEvent::log(kind.name(), err.to_string()));
        }
    }
    shell.emit(ServiceEvent::status(kind.name(), ServiceStatus::Stopped));
}
