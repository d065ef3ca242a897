//! Terminal stand-in for the desktop window

use std::io::{BufRead, Write};

use async_trait::async_trait;
use gostream_core::{Error, Notice, NoticeLevel, Prompt, ServiceEvent, Shell};
use tokio::sync::{mpsc, Mutex};

/// Prints events and reads answers from stdin.
///
/// Commands and prompt answers share one line reader, so a prompt simply
/// takes the next line typed.
pub struct ConsoleShell {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl ConsoleShell {
    /// Start reading stdin on a plain thread; blocking reads must not keep
    /// the runtime from shutting down.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(16);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Next input line, `None` once stdin is closed.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

fn print_flush(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{text}");
    let _ = stdout.flush();
}

#[async_trait]
impl Shell for ConsoleShell {
    fn emit(&self, event: ServiceEvent) {
        match event {
            ServiceEvent::Log { source, line } => println!("[{source}] {line}"),
            ServiceEvent::Status { service, status } => println!("* {service}: {status}"),
            ServiceEvent::TitleUpdated(title) => println!("* title: {title}"),
            ServiceEvent::StreamKey(key) => println!("* stream key: {key}"),
        }
    }

    async fn confirm(&self, prompt: Prompt) -> gostream_core::Result<bool> {
        print_flush(&format!(
            "\n== {} ==\n{}\n[y/N] ",
            prompt.title, prompt.message
        ));
        match self.next_line().await {
            Some(answer) => Ok(matches!(
                answer.trim().to_ascii_lowercase().as_str(),
                "y" | "yes"
            )),
            None => Err(Error::Dialog("input closed".to_string())),
        }
    }

    async fn notify(&self, notice: Notice) -> gostream_core::Result<()> {
        let marker = match notice.level {
            NoticeLevel::Info => "i",
            NoticeLevel::Error => "!",
        };
        println!("[{marker}] {}: {}", notice.title, notice.message);
        Ok(())
    }
}
