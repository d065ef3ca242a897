//! Publishing key lookup through the control API
//!
//! The media engine creates the channel key lazily and may not be listening
//! yet when the backend starts, so the key is polled until it arrives.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::events::{ServiceEvent, Shell, SYSTEM_SOURCE};
use crate::state::{Activation, Shared};

/// Shown while the key has not been fetched yet.
pub const FETCHING: &str = "Fetching...";
/// Shown while the backend is stopped.
pub const UNAVAILABLE: &str = "N/A";

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("Error fetching stream key: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Error reading stream key response: {0}")]
    Read(#[source] reqwest::Error),
    #[error("Error parsing stream key JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    data: String,
}

#[derive(Clone)]
pub struct StreamKeyPoller {
    client: reqwest::Client,
    interval: Duration,
    shared: Arc<Shared>,
    shell: Arc<dyn Shell>,
    tracker: TaskTracker,
}

impl StreamKeyPoller {
    pub fn new(
        client: reqwest::Client,
        interval: Duration,
        shared: Arc<Shared>,
        shell: Arc<dyn Shell>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            client,
            interval,
            shared,
            shell,
            tracker,
        }
    }

    /// Poll `url` until it yields a key. Only one poll runs at a time.
    pub fn start(&self, url: String) -> bool {
        let activation = self.shared.lock().stream_key.begin();
        let Some(activation) = activation else {
            return false;
        };

        self.shell.emit(ServiceEvent::StreamKey(FETCHING.to_string()));
        let this = self.clone();
        self.tracker
            .spawn(async move { this.poll(url, activation).await });
        true
    }

    pub fn stop(&self) -> bool {
        self.shared.lock().stream_key.cancel()
    }

    async fn poll(self, url: String, activation: Activation) {
        self.shared
            .lock()
            .stream_key
            .mark_running(activation.generation);
        let token = activation.token;

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                () = token.cancelled() => break,
                result = self.fetch(&url) => result,
            };
            match result {
                Ok(Some(key)) => {
                    info!("Stream key received");
                    self.shell.emit(ServiceEvent::StreamKey(key));
                    break;
                }
                Ok(None) => {}
                Err(FetchError::Request(e)) => {
                    debug!(error = %e, "Stream key request failed");
                    self.shell.emit(ServiceEvent::log(
                        SYSTEM_SOURCE,
                        "Error fetching stream key, retrying...",
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Stream key response rejected");
                    self.shell.emit(ServiceEvent::log(SYSTEM_SOURCE, e.to_string()));
                }
            }
        }

        if token.is_cancelled() {
            debug!("Stream key fetch cancelled");
        }
        self.shared.lock().stream_key.finish(activation.generation);
    }

    /// `Ok(None)` for a non-success status, which is retried silently.
    async fn fetch(&self, url: &str) -> Result<Option<String>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Request)?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "Stream key not available yet");
            return Ok(None);
        }
        let body = response.bytes().await.map_err(FetchError::Read)?;
        let parsed: KeyResponse = serde_json::from_slice(&body)?;
        Ok(Some(parsed.data))
    }
}
