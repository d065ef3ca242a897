use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TunnelClient;
use crate::events::{ServiceEvent, Shell};
use crate::state::Service;

/// Runs the `frpc` executable as a child process.
///
/// Every line the client prints is forwarded to the shell as a log event.
pub struct FrpcClient {
    program: String,
    shell: Arc<dyn Shell>,
}

impl FrpcClient {
    pub fn new(program: impl Into<String>, shell: Arc<dyn Shell>) -> Self {
        Self {
            program: program.into(),
            shell,
        }
    }
}

#[async_trait]
impl TunnelClient for FrpcClient {
    async fn run(&self, config_path: &Path, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut child = Command::new(&self.program)
            .arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;
        info!(program = %self.program, pid = ?child.id(), "Tunnel client started");

        let mut pipes = JoinSet::new();
        if let Some(stdout) = child.stdout.take() {
            pipes.spawn(forward_lines(stdout, Arc::clone(&self.shell)));
        }
        if let Some(stderr) = child.stderr.take() {
            pipes.spawn(forward_lines(stderr, Arc::clone(&self.shell)));
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.context("failed to wait for tunnel client")?;
                while pipes.join_next().await.is_some() {}
                if !status.success() {
                    bail!("{} exited with {status}", self.program);
                }
                Ok(())
            }
            () = cancel.cancelled() => {
                debug!("Killing tunnel client");
                child.kill().await.context("failed to kill tunnel client")?;
                pipes.abort_all();
                Ok(())
            }
        }
    }
}

async fn forward_lines<R>(reader: R, shell: Arc<dyn Shell>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "gostream::tunnel", "{line}");
        shell.emit(ServiceEvent::log(Service::Tunnel.name(), line));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::{Notice, Prompt};
    use parking_lot::Mutex;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    #[derive(Default)]
    struct Lines(Mutex<Vec<ServiceEvent>>);

    #[async_trait]
    impl Shell for Lines {
        fn emit(&self, event: ServiceEvent) {
            self.0.lock().push(event);
        }

        async fn confirm(&self, _prompt: Prompt) -> crate::Result<bool> {
            Ok(true)
        }

        async fn notify(&self, _notice: Notice) -> crate::Result<()> {
            Ok(())
        }
    }

    /// `sh -c <script>` runs the script, standing in for `frpc -c <config>`.
    fn script(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("frpc.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_output_lines_become_log_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo 'login to server success'\necho 'proxy added' >&2");
        let shell = Arc::new(Lines::default());
        let client = FrpcClient::new("sh", shell.clone());

        client.run(&path, CancellationToken::new()).await.unwrap();

        let events = shell.0.lock().clone();
        assert!(events.contains(&ServiceEvent::log("tunnel", "login to server success")));
        assert!(events.contains(&ServiceEvent::log("tunnel", "proxy added")));
    }

    #[tokio::test]
    async fn test_failed_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "exit 3");
        let client = FrpcClient::new("sh", Arc::new(Lines::default()));

        assert!(client.run(&path, CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "sleep 30");
        let client = FrpcClient::new("sh", Arc::new(Lines::default()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        tokio::time::timeout(Duration::from_secs(5), client.run(&path, cancel))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let client = FrpcClient::new("gostream-no-such-frpc", Arc::new(Lines::default()));
        let err = client
            .run(Path::new("frpc.toml"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
