use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media: MediaConfig,
    pub edge: EdgeConfig,
    pub tunnel: TunnelConfig,
    pub stream_key: StreamKeyConfig,
    pub logging: LoggingConfig,
}

/// Bind addresses of the media engine sub-servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub ingest_address: String,
    pub hls_address: String,
    pub flv_address: String,
    /// Empty disables the control API sub-server.
    pub api_address: String,
    pub app_name: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ingest_address: "0.0.0.0:1935".to_string(),
            hls_address: "0.0.0.0:7002".to_string(),
            flv_address: "0.0.0.0:7001".to_string(),
            api_address: "0.0.0.0:8090".to_string(),
            app_name: "live".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub address: String,
    pub control_upstream: String,
    pub hls_upstream: String,
    pub flv_upstream: String,
    pub shutdown_timeout_seconds: u64,
    pub default_title: String,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:7180".to_string(),
            control_upstream: "http://127.0.0.1:8090".to_string(),
            hls_upstream: "http://127.0.0.1:7002".to_string(),
            flv_upstream: "http://127.0.0.1:7001".to_string(),
            shutdown_timeout_seconds: 5,
            default_title: "GoStream".to_string(),
        }
    }
}

impl EdgeConfig {
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Configuration artifact that must exist before the tunnel may start
    pub config_path: PathBuf,
    /// Tunnel client executable
    pub program: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("frpc.toml"),
            program: "frpc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamKeyConfig {
    pub room: String,
    pub poll_interval_ms: u64,
}

impl Default for StreamKeyConfig {
    fn default() -> Self {
        Self {
            room: "movie".to_string(),
            poll_interval_ms: 2000,
        }
    }
}

impl StreamKeyConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // GOSTREAM_EDGE__ADDRESS, GOSTREAM_MEDIA__HLS_ADDRESS, ...
        builder = builder.add_source(
            Environment::with_prefix("GOSTREAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let addresses = [
            ("media.ingest_address", &self.media.ingest_address),
            ("media.hls_address", &self.media.hls_address),
            ("media.flv_address", &self.media.flv_address),
            ("edge.address", &self.edge.address),
        ];
        for (field, value) in addresses {
            if value.parse::<SocketAddr>().is_err() {
                errors.push(format!("{field} '{value}' is not a valid socket address"));
            }
        }
        if !self.media.api_address.is_empty()
            && self.media.api_address.parse::<SocketAddr>().is_err()
        {
            errors.push(format!(
                "media.api_address '{}' is not a valid socket address",
                self.media.api_address
            ));
        }

        let upstreams = [
            ("edge.control_upstream", &self.edge.control_upstream),
            ("edge.hls_upstream", &self.edge.hls_upstream),
            ("edge.flv_upstream", &self.edge.flv_upstream),
        ];
        for (field, value) in upstreams {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                errors.push(format!("{field} must start with http:// or https://"));
            } else if url::Url::parse(value).is_err() {
                errors.push(format!("{field} '{value}' is not a valid URL"));
            }
        }

        if self.media.app_name.is_empty() {
            errors.push("media.app_name cannot be empty".to_string());
        }
        if self.stream_key.room.is_empty() {
            errors.push("stream_key.room cannot be empty".to_string());
        }
        if self.stream_key.poll_interval_ms == 0 {
            errors.push("stream_key.poll_interval_ms must be greater than zero".to_string());
        }
        if self.tunnel.program.is_empty() {
            errors.push("tunnel.program cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Stream-key lookup URL, routed through the edge server like a viewer would.
    #[must_use]
    pub fn stream_key_url(&self, edge_addr: SocketAddr) -> String {
        let host = if edge_addr.ip().is_unspecified() {
            "127.0.0.1".to_string()
        } else {
            edge_addr.ip().to_string()
        };
        format!(
            "http://{host}:{}/control/get?room={}",
            edge_addr.port(),
            self.stream_key.room
        )
    }
}
