use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::media::{HlsSink, SubServer};

/// Protocol handling for one ingest connection.
#[async_trait]
pub trait IngestHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        hls: Arc<dyn HlsSink>,
    ) -> anyhow::Result<()>;
}

/// Accepts and immediately closes publisher connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropIngest;

#[async_trait]
impl IngestHandler for DropIngest {
    async fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        _hls: Arc<dyn HlsSink>,
    ) -> anyhow::Result<()> {
        info!(%peer, "Ingest connection without protocol handler, closing");
        drop(stream);
        Ok(())
    }
}

pub(super) struct IngestServer {
    handler: Arc<dyn IngestHandler>,
    hls: Arc<dyn HlsSink>,
}

impl IngestServer {
    pub(super) fn new(handler: Arc<dyn IngestHandler>, hls: Arc<dyn HlsSink>) -> Self {
        Self { handler, hls }
    }
}

/// Pause after an accept error that is not tied to a single connection,
/// such as running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Source of inbound publisher connections.
#[async_trait]
trait Accept: Send {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

impl IngestServer {
    async fn run(&self, mut incoming: impl Accept) -> anyhow::Result<()> {
        // Sessions live in the set so closing the listener also ends them.
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = incoming.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Ingest connection accepted");
                        let handler = Arc::clone(&self.handler);
                        let hls = Arc::clone(&self.hls);
                        sessions.spawn(async move {
                            if let Err(e) = handler.handle(stream, peer, hls).await {
                                warn!(%peer, error = %e, "Ingest session failed");
                            }
                        });
                    }
                    Err(e) if is_connection_error(&e) => {
                        debug!(error = %e, "Ingest connection dropped before accept");
                    }
                    Err(e) => {
                        error!(error = %e, "Ingest accept failed, retrying");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }
    }
}

#[async_trait]
impl SubServer for IngestServer {
    async fn serve(self: Box<Self>, listener: TcpListener) -> anyhow::Result<()> {
        self.run(listener).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::builtin::SegmentStore;
    use crate::media::HlsSegment;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use tokio::io::AsyncReadExt;

    struct OneSegment;

    #[async_trait]
    impl IngestHandler for OneSegment {
        async fn handle(
            &self,
            _stream: TcpStream,
            _peer: SocketAddr,
            hls: Arc<dyn HlsSink>,
        ) -> anyhow::Result<()> {
            hls.push_segment(
                "movie",
                HlsSegment {
                    sequence: 0,
                    duration: Duration::from_secs(2),
                    data: Bytes::from_static(b"ts"),
                },
            );
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sessions_feed_hls_sink() {
        let store = Arc::new(SegmentStore::new(6));
        let server = Box::new(IngestServer::new(Arc::new(OneSegment), store.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(server.serve(listener));

        let mut conn = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        // Handler returns and drops the stream: the client sees EOF.
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
        assert!(store.segment("movie", 0).is_some());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
    }

    /// Hands out a fixed sequence of accept results, then blocks.
    struct Scripted(VecDeque<io::Result<(TcpStream, SocketAddr)>>);

    #[async_trait]
    impl Accept for Scripted {
        async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
            match self.0.pop_front() {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_accept_errors_do_not_end_ingest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let accepted = listener.accept().await.unwrap();

        let incoming = Scripted(VecDeque::from([
            Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            Err(io::Error::other("too many open files")),
            Ok(accepted),
        ]));
        let store = Arc::new(SegmentStore::new(6));
        let server = IngestServer::new(Arc::new(OneSegment), store.clone());
        let task = tokio::spawn(async move { server.run(incoming).await });

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.segment("movie", 0).is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(!task.is_finished());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_default_handler_closes_connection() {
        let store: Arc<dyn HlsSink> = Arc::new(SegmentStore::new(6));
        let server = Box::new(IngestServer::new(Arc::new(DropIngest), store));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(server.serve(listener));

        let mut conn = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
        task.abort();
    }
}
