use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to bind {service} on {address}: {source}")]
    Bind {
        service: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel configuration {} not found", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Sub-server {0} panicked")]
    SubServerPanic(&'static str),

    #[error("Dialog error: {0}")]
    Dialog(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failures the shell should surface to the user instead of only logging.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::Bind { .. } | Self::ConfigMissing(_) | Self::Dialog(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
