//! Contract with the desktop shell
//!
//! The core pushes one-way [`ServiceEvent`]s to the shell and asks it for
//! notices and blocking confirmations.  It never waits for an answer to an
//! event.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

pub const SYSTEM_SOURCE: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

impl ServiceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications pushed to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServiceEvent {
    #[serde(rename = "service:log")]
    Log { source: String, line: String },

    #[serde(rename = "service:status")]
    Status {
        service: String,
        status: ServiceStatus,
    },

    #[serde(rename = "title:updated")]
    TitleUpdated(String),

    #[serde(rename = "streamkey:update")]
    StreamKey(String),
}

impl ServiceEvent {
    pub fn log(source: impl Into<String>, line: impl Into<String>) -> Self {
        Self::Log {
            source: source.into(),
            line: line.into(),
        }
    }

    pub fn status(service: impl Into<String>, status: ServiceStatus) -> Self {
        Self::Status {
            service: service.into(),
            status,
        }
    }

    /// Event name as seen by the frontend.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "service:log",
            Self::Status { .. } => "service:status",
            Self::TitleUpdated(_) => "title:updated",
            Self::StreamKey(_) => "streamkey:update",
        }
    }
}

/// A yes/no question shown before an action that needs consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
}

impl Prompt {
    #[must_use]
    pub fn tunnel_consent() -> Self {
        Self {
            title: "Security and compliance notice".to_string(),
            message: "Starting the tunnel exposes your local live stream on the public internet. \
                      Anyone with your public address can watch it.\n\
                      Make sure the content is suitable for public distribution and protect your \
                      personal information. Follow the laws and regulations of your country and \
                      of the region where the relay runs. You are fully responsible for \
                      everything published through this application.\n\
                      Do you want to continue?"
                .to_string(),
        }
    }

    #[must_use]
    pub fn quit() -> Self {
        Self {
            title: "Quit?".to_string(),
            message: "Are you sure you want to quit?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message the user acknowledges but does not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn tunnel_config_missing(path: &Path) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "Error".to_string(),
            message: format!("{} not found, the tunnel will not start.", path.display()),
        }
    }

    #[must_use]
    pub fn services_starting() -> Self {
        Self {
            level: NoticeLevel::Info,
            title: "Services starting".to_string(),
            message: "Services will listen on local ports, please be aware of security."
                .to_string(),
        }
    }
}

/// The GUI collaborator.
#[async_trait]
pub trait Shell: Send + Sync + 'static {
    /// Push a one-way event. Must not block.
    fn emit(&self, event: ServiceEvent);

    /// Ask a blocking yes/no question. `Ok(true)` means the user agreed; a
    /// negative answer and an error both mean "do not proceed".
    async fn confirm(&self, prompt: Prompt) -> Result<bool>;

    /// Show a notice and wait until it has been displayed.
    async fn notify(&self, notice: Notice) -> Result<()>;
}
