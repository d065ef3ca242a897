//! Entry point used by the desktop shell
//!
//! The [`Controller`] owns every piece of orchestration state and exposes the
//! operations bound to the GUI: starting and stopping the backend (media
//! engine plus edge server) as one unit, toggling the tunnel, the display
//! title, and process shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::edge::EdgeServer;
use crate::error::{Error, Result};
use crate::events::{Notice, Prompt, ServiceEvent, Shell, SYSTEM_SOURCE};
use crate::media::{ListenerRegistry, MediaEngine, MediaSupervisor, SubServerKind};
use crate::state::{Service, ServiceState, Shared};
use crate::stream_key::{StreamKeyPoller, UNAVAILABLE};
use crate::tunnel::{TunnelClient, TunnelOutcome, TunnelSupervisor};

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Controller {
    config: Config,
    shared: Arc<Shared>,
    shell: Arc<dyn Shell>,
    tracker: TaskTracker,
    /// Serializes backend start/stop and shutdown.
    gate: tokio::sync::Mutex<()>,
    registry: ListenerRegistry,
    media: MediaSupervisor,
    edge: EdgeServer,
    tunnel: TunnelSupervisor,
    stream_key: StreamKeyPoller,
}

impl Controller {
    pub fn new(
        config: Config,
        engine: Arc<dyn MediaEngine>,
        tunnel_client: Arc<dyn TunnelClient>,
        shell: Arc<dyn Shell>,
    ) -> Result<Self> {
        let shared = Shared::new(config.edge.default_title.clone());
        let tracker = TaskTracker::new();
        let registry = ListenerRegistry::new(Arc::clone(&shared));

        // Loopback upstreams only; never route through a system proxy.
        let proxy_client = reqwest::Client::builder()
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        let poll_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        let media = MediaSupervisor::new(
            config.media.clone(),
            engine,
            Arc::clone(&shared),
            registry.clone(),
            Arc::clone(&shell),
            tracker.clone(),
        );
        let edge = EdgeServer::new(
            config.edge.clone(),
            proxy_client,
            Arc::clone(&shared),
            Arc::clone(&shell),
            tracker.clone(),
        );
        let tunnel = TunnelSupervisor::new(
            config.tunnel.clone(),
            tunnel_client,
            Arc::clone(&shared),
            Arc::clone(&shell),
            tracker.clone(),
        );
        let stream_key = StreamKeyPoller::new(
            poll_client,
            config.stream_key.poll_interval(),
            Arc::clone(&shared),
            Arc::clone(&shell),
            tracker.clone(),
        );

        Ok(Self {
            config,
            shared,
            shell,
            tracker,
            gate: tokio::sync::Mutex::new(()),
            registry,
            media,
            edge,
            tunnel,
            stream_key,
        })
    }

    /// The shell finished starting; from now on closing asks for confirmation.
    pub fn startup(&self) {
        self.shared.lock().ready = true;
        info!("Application ready");
    }

    /// Start the media engine, then the edge server.
    ///
    /// Anything left over from a previous run is stopped first, so repeated
    /// calls never produce duplicate listeners.
    pub async fn start_backend(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        {
            let state = self.shared.lock();
            if state.shutting_down {
                warn!("Shutdown in progress, backend not started");
                return Ok(());
            }
            if state.backend_running {
                info!("Backend is already running");
                return Ok(());
            }
        }

        self.announce_start();

        self.media.stop().await;
        self.edge.stop().await;

        self.media.start();
        let edge_addr = match self.edge.start().await {
            Ok(addr) => addr,
            Err(e) => {
                error!(error = %e, "Failed to start web server");
                self.shell
                    .emit(ServiceEvent::log(SYSTEM_SOURCE, e.to_string()));
                self.media.stop().await;
                return Err(e);
            }
        };

        self.shared.lock().backend_running = true;
        info!(%edge_addr, "Backend started");
        self.stream_key
            .start(self.config.stream_key_url(edge_addr));
        Ok(())
    }

    pub async fn stop_backend(&self) {
        let _gate = self.gate.lock().await;
        if !self.shared.lock().backend_running {
            info!("Backend is not running");
            return;
        }

        self.stream_key.stop();
        self.edge.stop().await;
        self.media.stop().await;

        self.shared.lock().backend_running = false;
        self.shell
            .emit(ServiceEvent::StreamKey(UNAVAILABLE.to_string()));
        info!("Backend stopped");
    }

    /// Start the tunnel (after the config check and user consent) or stop it.
    pub async fn toggle_tunnel(&self) -> Result<TunnelOutcome> {
        let outcome = self.tunnel.toggle().await;
        if let Err(e) = &outcome {
            if e.is_user_visible() {
                self.shell
                    .emit(ServiceEvent::log(Service::Tunnel.name(), e.to_string()));
            }
        }
        outcome
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.shared.set_title(title.clone());
        info!(title = %title, "Display title updated");
        self.shell.emit(ServiceEvent::log(
            SYSTEM_SOURCE,
            format!("Title updated to: {title}"),
        ));
        self.shell.emit(ServiceEvent::TitleUpdated(title));
    }

    #[must_use]
    pub fn title(&self) -> String {
        self.shared.title()
    }

    /// Ask before the window closes. Returns `true` to keep the window open.
    ///
    /// Before [`startup`](Self::startup) the close goes through without
    /// asking. Only an explicit yes closes; a failing dialog keeps the window.
    pub async fn before_close(&self) -> bool {
        if !self.shared.lock().ready {
            return false;
        }
        match self.shell.confirm(Prompt::quit()).await {
            Ok(confirmed) => !confirmed,
            Err(e) => {
                warn!(error = %e, "Quit dialog failed, staying open");
                true
            }
        }
    }

    /// Stop everything and wait for every supervised task to finish.
    pub async fn shutdown(&self) {
        let _gate = self.gate.lock().await;
        let running = {
            let mut state = self.shared.lock();
            state.shutting_down = true;
            state.backend_running
        };

        if running {
            self.stream_key.stop();
            self.media.stop().await;
            self.edge.stop().await;
            self.shared.lock().backend_running = false;
        }
        self.tunnel.stop();

        self.tracker.close();
        self.tracker.wait().await;
        info!("All services stopped");
    }

    #[must_use]
    pub fn backend_running(&self) -> bool {
        self.shared.lock().backend_running
    }

    #[must_use]
    pub fn service_state(&self, service: Service) -> ServiceState {
        let state = self.shared.lock();
        match service {
            Service::Media => state.media.state(),
            Service::Edge => state.edge_state,
            Service::Tunnel => state.tunnel.state(),
        }
    }

    #[must_use]
    pub fn listener_addrs(&self) -> Vec<(SubServerKind, SocketAddr)> {
        self.registry.addrs()
    }

    #[must_use]
    pub fn edge_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().edge.as_ref().map(|h| h.addr)
    }

    /// Supervised tasks still running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    fn announce_start(&self) {
        let shell = Arc::clone(&self.shell);
        tokio::spawn(async move {
            if let Err(e) = shell.notify(Notice::services_starting()).await {
                warn!(error = %e, "Failed to show startup notice");
            }
        });
    }
}
