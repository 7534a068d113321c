pub mod actor;
pub mod health;
pub mod messages;
pub mod rooms;

use axum::Router;
use axum::routing::{delete, get, patch, post};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/rooms", post(rooms::create_room).get(rooms::list_rooms))
        .route(
            "/api/v1/rooms/:id",
            get(rooms::get_room).patch(rooms::update_room).delete(rooms::delete_room),
        )
        .route("/api/v1/rooms/:id/members", post(rooms::add_member))
        .route(
            "/api/v1/rooms/:id/members/:userId",
            delete(rooms::remove_member),
        )
        .route(
            "/api/v1/rooms/:id/messages",
            post(messages::create_message).get(messages::list_messages),
        )
        .route("/api/v1/messages/:id", patch(messages::update_message).delete(messages::delete_message))
}
