use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::models::{self, Room, RoomType};
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
pub struct CreateRoomBody {
    pub name: String,
    #[serde(rename = "roomType", default)]
    pub room_type: Option<String>,
}

pub async fn create_room(
    State(state): State<AppState>,
    ActorId(actor_id): ActorId,
    Json(body): Json<CreateRoomBody>,
) -> Result<Json<Room>, AppError> {
    let room_type = body
        .room_type
        .as_deref()
        .and_then(RoomType::from_str)
        .unwrap_or(RoomType::Private);
    let room = state.db.create_room(&body.name, &actor_id, room_type)?;

    let services = services(&state);
    let message = state.db.synthesize_event_message(
        models::COMMAND_CREATE_ROOM,
        &room.id,
        &actor_id,
        &room.id,
    )?;
    broadcast(&services, &room.id, &message).await?;
    Ok(Json(room))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.db.find_room(&id)?))
}

pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<Vec<Room>>, AppError> {
    // Deliberately minimal: the full list/paginate/search surface is out of scope
    // for the delivery core (spec §1); this exists only so the HTTP surface compiles
    // and the reserved rooms are visible after bootstrap.
    let general = state.db.find_room(&state.config.general_room_id)?;
    let announcements = state.db.find_room(&state.config.announcements_room_id)?;
    Ok(Json(vec![general, announcements]))
}

#[derive(Deserialize)]
pub struct UpdateRoomBody {
    pub name: Option<String>,
}

pub async fn update_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ActorId(actor_id): ActorId,
    Json(body): Json<UpdateRoomBody>,
) -> Result<Json<Room>, AppError> {
    let room = state
        .db
        .update_room(&id, &actor_id, body.name.as_deref(), None)?;

    let services = services(&state);
    let message = state
        .db
        .synthesize_event_message(models::COMMAND_UPDATE_ROOM, &id, &actor_id, &id)?;
    broadcast(&services, &id, &message).await?;
    Ok(Json(room))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ActorId(actor_id): ActorId,
) -> Result<(), AppError> {
    state.db.delete_room(&id, &actor_id)?;

    let services = services(&state);
    let message =
        state
            .db
            .synthesize_event_message(models::COMMAND_DELETE_ROOM, &id, &actor_id, &id)?;
    broadcast(&services, &id, &message).await?;
    Ok(())
}

#[derive(Deserialize)]
pub struct AddMemberBody {
    #[serde(rename = "userId")]
    pub user_id: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ActorId(actor_id): ActorId,
    Json(body): Json<AddMemberBody>,
) -> Result<(), AppError> {
    state
        .db
        .add_user_to_room(&room_id, &body.user_id, &actor_id)?;

    let services = services(&state);
    let message = state.db.synthesize_event_message(
        models::COMMAND_ADD_USER,
        &room_id,
        &actor_id,
        &body.user_id,
    )?;
    broadcast(&services, models::CHANNEL_GLOBAL, &message).await?;
    Ok(())
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((room_id, user_id)): Path<(String, String)>,
    ActorId(actor_id): ActorId,
) -> Result<(), AppError> {
    state
        .db
        .remove_user_from_room(&room_id, &user_id, &actor_id)?;

    let services = services(&state);
    let message = state.db.synthesize_event_message(
        models::COMMAND_REMOVE_USER,
        &room_id,
        &actor_id,
        &user_id,
    )?;
    broadcast(&services, &room_id, &message).await?;
    Ok(())
}
