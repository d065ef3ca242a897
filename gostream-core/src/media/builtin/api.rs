//! Control API: per-room channel keys

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

const KEY_LENGTH: usize = 48;

const KEY_ALPHABET: [char; 52] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L',
    'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Bidirectional room <-> publishing key map.
#[derive(Debug, Default)]
pub struct ChannelKeys {
    inner: RwLock<KeyMaps>,
}

#[derive(Debug, Default)]
struct KeyMaps {
    by_room: HashMap<String, String>,
    by_key: HashMap<String, String>,
}

impl ChannelKeys {
    /// Key of `room`, generated on first use.
    pub fn get_or_create(&self, room: &str) -> String {
        if let Some(key) = self.inner.read().by_room.get(room) {
            return key.clone();
        }
        let mut maps = self.inner.write();
        if let Some(key) = maps.by_room.get(room) {
            return key.clone();
        }
        let key = nanoid::nanoid!(KEY_LENGTH, &KEY_ALPHABET);
        maps.insert(room, key.clone());
        key
    }

    /// Replace the key of `room`, invalidating the old one.
    pub fn reset(&self, room: &str) -> String {
        let key = nanoid::nanoid!(KEY_LENGTH, &KEY_ALPHABET);
        let mut maps = self.inner.write();
        if let Some(old) = maps.by_room.remove(room) {
            maps.by_key.remove(&old);
        }
        maps.insert(room, key.clone());
        key
    }

    pub fn delete(&self, room: &str) -> bool {
        let mut maps = self.inner.write();
        match maps.by_room.remove(room) {
            Some(key) => {
                maps.by_key.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Room a publisher presenting `key` is allowed to publish to.
    #[must_use]
    pub fn room_for_key(&self, key: &str) -> Option<String> {
        self.inner.read().by_key.get(key).cloned()
    }
}

impl KeyMaps {
    fn insert(&mut self, room: &str, key: String) {
        self.by_key.insert(key.clone(), room.to_string());
        self.by_room.insert(room.to_string(), key);
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse {
    status: u16,
    data: String,
}

impl ApiResponse {
    fn ok(data: String) -> Response {
        Self::with_status(StatusCode::OK, data)
    }

    fn with_status(status: StatusCode, data: String) -> Response {
        let body = Json(Self {
            status: status.as_u16(),
            data,
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RoomQuery {
    room: Option<String>,
}

impl RoomQuery {
    fn room(self, action: &str) -> Result<String, Response> {
        match self.room {
            Some(room) if !room.is_empty() => Ok(room),
            _ => Err(ApiResponse::with_status(
                StatusCode::BAD_REQUEST,
                format!("url: /control/{action}?room=<ROOM_NAME>"),
            )),
        }
    }
}

pub(super) fn router(keys: Arc<ChannelKeys>) -> Router {
    Router::new()
        .route("/control/get", any(get_key))
        .route("/control/reset", any(reset_key))
        .route("/control/delete", any(delete_key))
        .with_state(keys)
}

async fn get_key(State(keys): State<Arc<ChannelKeys>>, Query(query): Query<RoomQuery>) -> Response {
    match query.room("get") {
        Ok(room) => ApiResponse::ok(keys.get_or_create(&room)),
        Err(response) => response,
    }
}

async fn reset_key(
    State(keys): State<Arc<ChannelKeys>>,
    Query(query): Query<RoomQuery>,
) -> Response {
    match query.room("reset") {
        Ok(room) => {
            info!(room = %room, "Channel key reset");
            ApiResponse::ok(keys.reset(&room))
        }
        Err(response) => response,
    }
}

async fn delete_key(
    State(keys): State<Arc<ChannelKeys>>,
    Query(query): Query<RoomQuery>,
) -> Response {
    let room = match query.room("delete") {
        Ok(room) => room,
        Err(response) => return response,
    };
    if keys.delete(&room) {
        info!(room = %room, "Channel key deleted");
        ApiResponse::ok("ok".to_string())
    } else {
        ApiResponse::with_status(StatusCode::NOT_FOUND, "room not found".to_string())
    }
}
