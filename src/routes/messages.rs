use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::models::Message;
use crate::routes::actor::ActorId;
use crate::ws::dispatcher::{Services, broadcast};

fn services(state: &AppState) -> Services {
    Services {
        db: state.db.clone(),
        bus: state.bus.clone(),
        config: state.config.clone(),
    }
}

#[derive(Deserialize)]
pub struct CreateMessageBody {
    pub text: String,
}

pub async fn create_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ActorId(actor_id): ActorId,
    Json(body): Json<CreateMessageBody>,
) -> Result<Json<Message>, AppError> {
    let user = state.db.find_user(&actor_id)?;
    let message = state
        .db
        .create_message(&room_id, &user, &body.text)?
        .with_author(Some(&user));
    let services = services(&state);
    broadcast(&services, &room_id, &message).await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    Ok(Json(state.db.list_messages(&room_id, query.limit)?))
}

#[derive(Deserialize)]
pub struct UpdateMessageBody {
    pub text: String,
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ActorId(actor_id): ActorId,
    Json(body): Json<UpdateMessageBody>,
) -> Result<Json<Message>, AppError> {
    let message = state.db.update_message(&id, &actor_id, &body.text)?;
    let services = services(&state);
    broadcast(&services, &message.room_id.clone(), &message).await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ActorId(actor_id): ActorId,
) -> Result<Json<Message>, AppError> {
    let message = state.db.delete_message(&id, &actor_id)?;
    let services = services(&state);
    broadcast(&services, &message.room_id.clone(), &message).await?;
    Ok(Json(message))
}
