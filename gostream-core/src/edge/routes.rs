use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures::StreamExt;
use gostream_proxy::Upstream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::assets::{html_target, render_page, static_asset};
use crate::state::Shared;

/// Request-independent state of one edge server activation.
#[derive(Clone)]
pub struct EdgeState {
    pub(super) shared: Arc<Shared>,
    pub(super) control: Upstream,
    pub(super) hls: Upstream,
    pub(super) flv: Upstream,
    /// Fired when the edge server shuts down; ends proxied bodies still streaming.
    pub(super) shutdown: CancellationToken,
}

pub fn router(state: EdgeState) -> Router {
    Router::new()
        .route("/control/", any(proxy_control))
        .route("/control/{*rest}", any(proxy_control))
        .route("/live/movie.m3u8", any(proxy_hls))
        .route("/live/movie/{*rest}", any(proxy_hls))
        .route("/live/movie.flv", any(proxy_flv))
        .fallback(serve_page)
        .layer(middleware::from_fn(live_cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_page(State(state): State<EdgeState>, uri: Uri) -> Response {
    let path = uri.path();
    match html_target(path) {
        Some(page) => render_page(page, &state.shared.title()),
        None => static_asset(path),
    }
}

async fn proxy_control(State(state): State<EdgeState>, req: Request) -> Response {
    forward(&state.control, &state.shutdown, req).await
}

async fn proxy_hls(State(state): State<EdgeState>, req: Request) -> Response {
    forward(&state.hls, &state.shutdown, req).await
}

async fn proxy_flv(State(state): State<EdgeState>, req: Request) -> Response {
    forward(&state.flv, &state.shutdown, req).await
}

async fn forward(upstream: &Upstream, shutdown: &CancellationToken, req: Request) -> Response {
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let path = req.uri().path().to_string();

    match upstream.forward(req, client_addr).await {
        Ok(response) => {
            let done = shutdown.clone().cancelled_owned();
            response.map(|body| Body::from_stream(body.into_data_stream().take_until(done)))
        }
        Err(e) => {
            if e.is_upstream_unavailable() {
                warn!(path = %path, upstream = %upstream.origin(), error = %e, "Upstream unavailable");
            } else {
                error!(path = %path, error = %e, "Proxy error");
            }
            e.into_response()
        }
    }
}

/// Stream paths are fetched cross-origin by browser players.
async fn live_cors(req: Request, next: Next) -> Response {
    let is_live = req.uri().path().starts_with("/live/");
    let mut response = next.run(req).await;
    if is_live {
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
    }
    response
}
