pub mod dispatcher;
pub mod frame;
pub mod session;

use std::collections::HashSet;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use crate::AppState;
use crate::auth;
use crate::models::CHANNEL_GLOBAL;

#[derive(Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

fn extract_token(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(s) = value.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    query.token.clone()
}

/// `GET /api/ws` — resolves the bearer token to a user id, seeds the initial
/// subscription set from the user's memberships, and upgrades to a socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = extract_token(&headers, &query) else {
        return (axum::http::StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    };
    let user_id = match auth::validate(&token, &state.config.jwt_secret) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "admission token rejected");
            return (axum::http::StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let (_user, rooms) = match state.db.find_user_with_rooms(&user_id) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "admission user lookup failed");
            return (axum::http::StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let mut initial_channels: HashSet<String> = rooms.into_iter().collect();
    initial_channels.insert(CHANNEL_GLOBAL.to_string());
    initial_channels.insert(state.config.general_room_id.clone());
    initial_channels.insert(state.config.announcements_room_id.clone());

    ws.on_upgrade(move |socket| {
        session::run(
            socket,
            user_id,
            initial_channels,
            state.db,
            state.bus,
            state.config,
        )
    })
}
