use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::AppState;

pub async fn health(State(_state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "service": "room-relay" }))
}
