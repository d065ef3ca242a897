// Edge HTTP server
//
// One listener in front of everything: the embedded viewer pages with the
// current display title, reverse proxies to the media engine, and CORS on
// the stream paths.

pub mod assets;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use gostream_proxy::Upstream;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

pub use routes::{router, EdgeState};

use crate::config::EdgeConfig;
use crate::error::{Error, Result};
use crate::events::{ServiceEvent, ServiceStatus, Shell};
use crate::state::{Service, ServiceState, Shared};

/// A running edge server.
#[derive(Debug)]
pub struct EdgeHandle {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct EdgeServer {
    config: EdgeConfig,
    client: reqwest::Client,
    shared: Arc<Shared>,
    shell: Arc<dyn Shell>,
    tracker: TaskTracker,
}

impl EdgeServer {
    pub fn new(
        config: EdgeConfig,
        client: reqwest::Client,
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
        }
    }

    fn upstream(&self, origin: &str) -> Result<Upstream> {
        Upstream::new(origin, self.client.clone()).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Bind the listener and start serving. Returns the bound address.
    ///
    /// Starting an already running server returns its address.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.shared.lock().edge.as_ref().map(|h| h.addr) {
            info!(%addr, "Web server already running");
            return Ok(addr);
        }

        let shutdown = CancellationToken::new();
        let state = EdgeState {
            shared: Arc::clone(&self.shared),
            control: self.upstream(&self.config.control_upstream)?,
            hls: self.upstream(&self.config.hls_upstream)?,
            flv: self.upstream(&self.config.flv_upstream)?,
            shutdown: shutdown.clone(),
        };

        self.shared.lock().edge_state = ServiceState::Starting;
        let listener = match TcpListener::bind(&self.config.address).await {
            Ok(listener) => listener,
            Err(source) => {
                self.shared.lock().edge_state = ServiceState::Stopped;
                return Err(Error::Bind {
                    service: Service::Edge.name(),
                    address: self.config.address.clone(),
                    source,
                });
            }
        };
        let addr = listener.local_addr()?;

        let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
        let signal = shutdown.clone().cancelled_owned();
        let task = self.tracker.spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "Web server error");
            }
        });

        {
            let mut state = self.shared.lock();
            state.edge = Some(EdgeHandle {
                addr,
                shutdown,
                task,
            });
            state.edge_state = ServiceState::Running;
        }
        info!(%addr, "Web server listening");
        self.shell.emit(ServiceEvent::status(
            Service::Edge.name(),
            ServiceStatus::Running,
        ));
        Ok(addr)
    }

    /// Graceful shutdown, bounded by the configured timeout.
    ///
    /// Past the deadline the server is forced closed; a timeout is logged but
    /// not reported as a failure.
    pub async fn stop(&self) {
        let handle = {
            let mut state = self.shared.lock();
            let handle = state.edge.take();
            if handle.is_some() {
                state.edge_state = ServiceState::Stopping;
            }
            handle
        };
        let Some(EdgeHandle { shutdown, task, .. }) = handle else {
            return;
        };

        info!("Stopping web server");
        shutdown.cancel();
        let abort = task.abort_handle();
        let timeout = self.config.shutdown_timeout();
        match tokio::time::timeout(timeout, task).await {
            Ok(_) => info!("Web server stopped"),
            Err(_) => {
                let err = Error::ShutdownTimeout(timeout);
                warn!(error = %err, "Forcing web server closed");
                abort.abort();
            }
        }

        self.shared.lock().edge_state = ServiceState::Stopped;
        self.shell.emit(ServiceEvent::status(
            Service::Edge.name(),
            ServiceStatus::Stopped,
        ));
    }
}
