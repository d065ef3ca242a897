use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::debug;

pub(super) fn router(app_name: &str) -> Router {
    Router::new()
        .route("/{app}/{file}", get(serve_flv))
        .with_state(Arc::<str>::from(app_name))
}

/// HTTP-FLV playback. The ingest handler in this engine does not remux to
/// FLV, so every stream reports as not published.
async fn serve_flv(
    Path((app, file)): Path<(String, String)>,
    State(app_name): State<Arc<str>>,
) -> Response {
    let Some(stream) = file.strip_suffix(".flv") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if app != *app_name {
        return StatusCode::NOT_FOUND.into_response();
    }
    debug!(app = %app, stream, "FLV requested for stream without publisher");
    (StatusCode::NOT_FOUND, "Stream not found").into_response()
}
