// In-process media engine
//
// Provides the control API (channel keys), the HLS segment window served over
// HTTP, the HTTP-FLV endpoint and the ingest listener. Protocol handling of
// ingested connections is delegated to an `IngestHandler`.

mod api;
mod flv;
mod hls;
mod ingest;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

pub use api::ChannelKeys;
pub use hls::SegmentStore;
pub use ingest::{DropIngest, IngestHandler};

use super::{BoxSubServer, HlsSink, MediaEngine, SubServer};

/// Number of segments kept per stream in the live playlist.
pub const DEFAULT_WINDOW: usize = 6;

pub struct LocalEngine {
    app_name: String,
    keys: Arc<ChannelKeys>,
    segments: Arc<SegmentStore>,
    ingest: Arc<dyn IngestHandler>,
}

impl LocalEngine {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            keys: Arc::new(ChannelKeys::default()),
            segments: Arc::new(SegmentStore::new(DEFAULT_WINDOW)),
            ingest: Arc::new(DropIngest),
        }
    }

    #[must_use]
    pub fn with_ingest_handler(mut self, handler: Arc<dyn IngestHandler>) -> Self {
        self.ingest = handler;
        self
    }

    /// Channel keys survive Stop/Start of the engine.
    #[must_use]
    pub fn keys(&self) -> Arc<ChannelKeys> {
        Arc::clone(&self.keys)
    }

    #[must_use]
    pub fn segments(&self) -> Arc<SegmentStore> {
        Arc::clone(&self.segments)
    }
}

impl MediaEngine for LocalEngine {
    fn hls_server(&self) -> (BoxSubServer, Arc<dyn HlsSink>) {
        let router = hls::router(&self.app_name, Arc::clone(&self.segments));
        let sink: Arc<dyn HlsSink> = Arc::clone(&self.segments) as Arc<dyn HlsSink>;
        (Box::new(HttpSubServer { router }), sink)
    }

    fn flv_server(&self) -> BoxSubServer {
        Box::new(HttpSubServer {
            router: flv::router(&self.app_name),
        })
    }

    fn api_server(&self) -> BoxSubServer {
        Box::new(HttpSubServer {
            router: api::router(Arc::clone(&self.keys)),
        })
    }

    fn ingest_server(&self, hls: Arc<dyn HlsSink>) -> BoxSubServer {
        Box::new(ingest::IngestServer::new(Arc::clone(&self.ingest), hls))
    }
}

/// An axum router served on a supervised listener.
struct HttpSubServer {
    router: Router,
}

#[async_trait]
impl SubServer for HttpSubServer {
    async fn serve(self: Box<Self>, listener: TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
