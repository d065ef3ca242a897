//! HLS over HTTP from an in-memory segment window

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::media::{HlsSegment, HlsSink};

#[derive(Debug, Default)]
struct StreamWindow {
    segments: VecDeque<HlsSegment>,
    ended: bool,
}

impl StreamWindow {
    fn playlist(&self, segment_prefix: &str) -> String {
        let mut m3u8 = String::new();
        m3u8.push_str("#EXTM3U\n");
        m3u8.push_str("#EXT-X-VERSION:3\n");

        let target = self
            .segments
            .iter()
            .map(|s| s.duration.as_millis().div_ceil(1000))
            .max()
            .unwrap_or(10);
        let _ = writeln!(m3u8, "#EXT-X-TARGETDURATION:{target}");

        let first_seq = self.segments.front().map_or(0, |s| s.sequence);
        let _ = writeln!(m3u8, "#EXT-X-MEDIA-SEQUENCE:{first_seq}");

        for segment in &self.segments {
            let _ = writeln!(m3u8, "#EXTINF:{:.3},", segment.duration.as_secs_f64());
            let _ = writeln!(m3u8, "{segment_prefix}/{}.ts", segment.sequence);
        }

        if self.ended {
            m3u8.push_str("#EXT-X-ENDLIST\n");
        }
        m3u8
    }
}

/// Sliding window of the most recent segments of every stream.
#[derive(Debug)]
pub struct SegmentStore {
    window: usize,
    streams: RwLock<HashMap<String, StreamWindow>>,
}

impl SegmentStore {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            streams: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn playlist(&self, stream: &str, segment_prefix: &str) -> Option<String> {
        self.streams
            .read()
            .get(stream)
            .filter(|w| !w.segments.is_empty())
            .map(|w| w.playlist(segment_prefix))
    }

    #[must_use]
    pub fn segment(&self, stream: &str, sequence: u64) -> Option<HlsSegment> {
        self.streams
            .read()
            .get(stream)?
            .segments
            .iter()
            .find(|s| s.sequence == sequence)
            .cloned()
    }
}

impl HlsSink for SegmentStore {
    fn push_segment(&self, stream: &str, segment: HlsSegment) {
        let mut streams = self.streams.write();
        let window = streams.entry(stream.to_string()).or_default();
        if window.ended {
            // A new publisher took over the stream name.
            *window = StreamWindow::default();
        }
        debug!(stream, sequence = segment.sequence, "HLS segment ready");
        window.segments.push_back(segment);
        while window.segments.len() > self.window {
            window.segments.pop_front();
        }
    }

    fn end_stream(&self, stream: &str) {
        if let Some(window) = self.streams.write().get_mut(stream) {
            window.ended = true;
        }
    }
}

#[derive(Clone)]
struct HlsState {
    app_name: Arc<str>,
    store: Arc<SegmentStore>,
}

pub(super) fn router(app_name: &str, store: Arc<SegmentStore>) -> Router {
    let state = HlsState {
        app_name: Arc::from(app_name),
        store,
    };
    Router::new()
        .route("/{app}/{file}", get(serve_playlist))
        .route("/{app}/{stream}/{segment}", get(serve_segment))
        .with_state(state)
}

async fn serve_playlist(
    Path((app, file)): Path<(String, String)>,
    State(state): State<HlsState>,
) -> Response {
    let Some(stream) = file.strip_suffix(".m3u8") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if app != *state.app_name {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.store.playlist(stream, &format!("/{app}/{stream}")) {
        Some(m3u8) => (
            [
                (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            m3u8,
        )
            .into_response(),
        None => {
            debug!(app = %app, stream, "Playlist requested for idle stream");
            (StatusCode::NOT_FOUND, "Stream not found or ended").into_response()
        }
    }
}

async fn serve_segment(
    Path((app, stream, segment)): Path<(String, String, String)>,
    State(state): State<HlsState>,
) -> Response {
    let sequence = segment
        .strip_suffix(".ts")
        .and_then(|s| s.parse::<u64>().ok());
    let (Some(sequence), true) = (sequence, app == *state.app_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match state.store.segment(&stream, sequence) {
        Some(segment) => (
            [
                (header::CONTENT_TYPE, "video/mp2t"),
                (header::CACHE_CONTROL, "public, max-age=90"),
            ],
            segment.data,
        )
            .into_response(),
        None => {
            warn!(stream = %stream, sequence, "Segment not found");
            (StatusCode::NOT_FOUND, "Segment not found").into_response()
        }
    }
}
