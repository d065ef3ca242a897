// Media engine contract and supervision
//
// The engine hands out sub-servers (ingest, HLS, FLV, control API); the
// supervisor binds their listeners, runs each one in isolation and registers
// the listeners so Stop can close them.

pub mod builtin;
pub mod registry;
pub mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpListener;

pub use builtin::LocalEngine;
pub use registry::{ListenerRegistry, ListenerSet, RegisteredListener};
pub use supervisor::MediaSupervisor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubServerKind {
    Ingest,
    Hls,
    Flv,
    Api,
}

impl SubServerKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Hls => "hls",
            Self::Flv => "flv",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for SubServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One protocol server of the media engine.
#[async_trait]
pub trait SubServer: Send + 'static {
    /// Serve connections accepted on `listener` until it fails.
    ///
    /// The supervisor closes the listener by dropping this future, so
    /// implementations must not hand the listener to a detached task.
    async fn serve(self: Box<Self>, listener: TcpListener) -> anyhow::Result<()>;
}

pub type BoxSubServer = Box<dyn SubServer>;

/// A finished transport-stream segment.
#[derive(Debug, Clone)]
pub struct HlsSegment {
    pub sequence: u64,
    pub duration: Duration,
    pub data: Bytes,
}

/// Handle through which ingest feeds the running HLS server.
pub trait HlsSink: Send + Sync + 'static {
    fn push_segment(&self, stream: &str, segment: HlsSegment);

    fn end_stream(&self, stream: &str);
}

/// Factory for the sub-servers of one media engine activation.
///
/// The ingest server is created last, from the HLS server's sink, so it can
/// only exist once HLS is being served.
pub trait MediaEngine: Send + Sync + 'static {
    fn hls_server(&self) -> (BoxSubServer, Arc<dyn HlsSink>);

    fn flv_server(&self) -> BoxSubServer;

    fn api_server(&self) -> BoxSubServer;

    fn ingest_server(&self, hls: Arc<dyn HlsSink>) -> BoxSubServer;
}
