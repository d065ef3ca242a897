// Fakes for the shell, the media engine and the tunnel client
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gostream_core::media::{BoxSubServer, HlsSegment, HlsSink, SubServer};
use gostream_core::{
    Config, Controller, Error, MediaEngine, Notice, Prompt, ServiceEvent, ServiceStatus, Shell,
    SubServerKind, TunnelClient,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Answer given to confirmation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Fail,
}

pub struct RecordingShell {
    events: Mutex<Vec<ServiceEvent>>,
    prompts: Mutex<Vec<Prompt>>,
    notices: Mutex<Vec<Notice>>,
    answer: Mutex<Answer>,
}

impl RecordingShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            answer: Mutex::new(Answer::Yes),
        })
    }

    pub fn answer(&self, answer: Answer) {
        *self.answer.lock() = answer;
    }

    pub fn events(&self) -> Vec<ServiceEvent> {
        self.events.lock().clone()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn has(&self, event: &ServiceEvent) -> bool {
        self.events.lock().contains(event)
    }

    pub fn has_status(&self, service: &str, status: ServiceStatus) -> bool {
        self.has(&ServiceEvent::status(service, status))
    }

    pub fn position(&self, event: &ServiceEvent) -> Option<usize> {
        self.events.lock().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &ServiceEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn stream_keys(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ServiceEvent::StreamKey(key) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn logs_from(&self, source: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ServiceEvent::Log { source: s, line } if s == source => Some(line.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Shell for RecordingShell {
    fn emit(&self, event: ServiceEvent) {
        self.events.lock().push(event);
    }

    async fn confirm(&self, prompt: Prompt) -> gostream_core::Result<bool> {
        self.prompts.lock().push(prompt);
        match *self.answer.lock() {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            Answer::Fail => Err(Error::Dialog("dialog closed unexpectedly".to_string())),
        }
    }

    async fn notify(&self, notice: Notice) -> gostream_core::Result<()> {
        self.notices.lock().push(notice);
        Ok(())
    }
}

/// What a fake sub-server does once it owns its listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Fail,
    Panic,
}

struct FakeServer {
    behavior: Behavior,
}

#[async_trait]
impl SubServer for FakeServer {
    async fn serve(self: Box<Self>, listener: TcpListener) -> anyhow::Result<()> {
        match self.behavior {
            Behavior::Accept => loop {
                let (stream, _) = listener.accept().await?;
                drop(stream);
            },
            Behavior::Fail => anyhow::bail!("codec initialization failed"),
            Behavior::Panic => panic!("sub-server exploded"),
        }
    }
}

struct NullSink;

impl HlsSink for NullSink {
    fn push_segment(&self, _stream: &str, _segment: HlsSegment) {}

    fn end_stream(&self, _stream: &str) {}
}

pub struct FakeEngine {
    shell: Arc<RecordingShell>,
    faults: Mutex<Vec<(SubServerKind, Behavior)>>,
    pub hls_builds: AtomicUsize,
    pub ingest_builds: AtomicUsize,
    /// Every ingest build happened after HLS reported Running.
    pub ingest_after_hls: AtomicBool,
}

impl FakeEngine {
    pub fn new(shell: Arc<RecordingShell>) -> Arc<Self> {
        Arc::new(Self {
            shell,
            faults: Mutex::new(Vec::new()),
            hls_builds: AtomicUsize::new(0),
            ingest_builds: AtomicUsize::new(0),
            ingest_after_hls: AtomicBool::new(true),
        })
    }

    pub fn fault(&self, kind: SubServerKind, behavior: Behavior) {
        self.faults.lock().push((kind, behavior));
    }

    fn server(&self, kind: SubServerKind) -> BoxSubServer {
        let behavior = self
            .faults
            .lock()
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(Behavior::Accept, |(_, b)| *b);
        Box::new(FakeServer { behavior })
    }
}

impl MediaEngine for FakeEngine {
    fn hls_server(&self) -> (BoxSubServer, Arc<dyn HlsSink>) {
        self.hls_builds.fetch_add(1, Ordering::SeqCst);
        (self.server(SubServerKind::Hls), Arc::new(NullSink))
    }

    fn flv_server(&self) -> BoxSubServer {
        self.server(SubServerKind::Flv)
    }

    fn api_server(&self) -> BoxSubServer {
        self.server(SubServerKind::Api)
    }

    fn ingest_server(&self, _hls: Arc<dyn HlsSink>) -> BoxSubServer {
        self.ingest_builds.fetch_add(1, Ordering::SeqCst);
        // Each activation emits one more hls Running event.
        let builds = self.ingest_builds.load(Ordering::SeqCst);
        let hls_running = self
            .shell
            .count(&ServiceEvent::status("hls", ServiceStatus::Running));
        if hls_running < builds {
            self.ingest_after_hls.store(false, Ordering::SeqCst);
        }
        self.server(SubServerKind::Ingest)
    }
}

/// Tunnel client that runs until cancelled, or exits right away.
#[derive(Default)]
pub struct ScriptedTunnel {
    exit_immediately: AtomicBool,
    pub runs: AtomicUsize,
    pub active: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl ScriptedTunnel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn exit_immediately(&self, value: bool) {
        self.exit_immediately.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl TunnelClient for ScriptedTunnel {
    async fn run(&self, _config_path: &Path, cancel: CancellationToken) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.exit_immediately.load(Ordering::SeqCst) {
            anyhow::bail!("login to server failed: authorization failed");
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every listener on an ephemeral loopback port, nothing reachable upstream.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.media.ingest_address = "127.0.0.1:0".to_string();
    config.media.hls_address = "127.0.0.1:0".to_string();
    config.media.flv_address = "127.0.0.1:0".to_string();
    config.media.api_address = "127.0.0.1:0".to_string();
    config.edge.address = "127.0.0.1:0".to_string();
    config.edge.control_upstream = "http://127.0.0.1:9".to_string();
    config.edge.hls_upstream = "http://127.0.0.1:9".to_string();
    config.edge.flv_upstream = "http://127.0.0.1:9".to_string();
    config.edge.shutdown_timeout_seconds = 1;
    config.stream_key.poll_interval_ms = 50;
    config.tunnel.config_path = dir.join("frpc.toml");
    config
}

pub struct Harness {
    pub controller: Controller,
    pub shell: Arc<RecordingShell>,
    pub engine: Arc<FakeEngine>,
    pub tunnel: Arc<ScriptedTunnel>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(edit: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        edit(&mut config);
        Self::build(config, dir, |_| {})
    }

    pub fn with_faults(faults: &[(SubServerKind, Behavior)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        Self::build(config, dir, |engine| {
            for (kind, behavior) in faults {
                engine.fault(*kind, *behavior);
            }
        })
    }

    fn build(config: Config, dir: tempfile::TempDir, setup: impl FnOnce(&FakeEngine)) -> Self {
        let shell = RecordingShell::new();
        let engine = FakeEngine::new(Arc::clone(&shell));
        setup(&engine);
        let tunnel = ScriptedTunnel::new();
        let controller = Controller::new(
            config,
            Arc::clone(&engine) as Arc<dyn MediaEngine>,
            Arc::clone(&tunnel) as Arc<dyn TunnelClient>,
            Arc::clone(&shell) as Arc<dyn Shell>,
        )
        .unwrap();
        Self {
            controller,
            shell,
            engine,
            tunnel,
            dir,
        }
    }

    pub fn write_tunnel_config(&self) {
        std::fs::write(
            self.dir.path().join("frpc.toml"),
            "serverAddr = \"relay.example.net\"\n",
        )
        .unwrap();
    }

    /// Wait until all four media listeners are registered.
    pub async fn wait_for_listeners(&self, expected: usize) {
        eventually(|| self.controller.listener_addrs().len() == expected).await;
    }

    pub fn listener_kinds(&self) -> HashSet<SubServerKind> {
        self.controller
            .listener_addrs()
            .into_iter()
            .map(|(kind, _)| kind)
            .collect()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// True once nothing listens on `addr` any more.
pub fn port_is_free(addr: std::net::SocketAddr) -> bool {
    std::net::TcpListener::bind(addr).is_ok()
}
