use std::sync::Arc;

use tracing::instrument;

use crate::bus::Bus;
use crate::config::Config;
use crate::db::Db;
use crate::error::AppError;
use crate::models::{self, Message, RoomType};
use crate::ws::frame::InboundFrame;
use crate::ws::session::SessionHandle;

#[derive(Clone)]
pub struct Services {
    pub db: Arc<Db>,
    pub bus: Arc<dyn Bus>,
    pub config: Arc<Config>,
}

pub(crate) async fn broadcast(services: &Services, channel: &str, message: &Message) -> Result<(), AppError> {
    let payload = serde_json::to_vec(message).expect("Message always serializes");
    services.bus.publish(channel, &payload).await?;
    Ok(())
}

/// Parses, validates (by the caller) and routes one inbound frame. Any service error
/// is returned to the read loop, which writes an Error frame and continues — no
/// session teardown — unless the error is itself session-fatal (Transport/Fatal).
#[instrument(skip(handle, services), fields(user_id = %handle.user_id, command = %frame.command))]
pub async fn dispatch(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    match frame.command.as_str() {
        models::COMMAND_CREATE_MESSAGE => create_message(frame, handle, services).await,
        models::COMMAND_UPDATE_MESSAGE => update_message(frame, handle, services).await,
        models::COMMAND_DELETE_MESSAGE => delete_message(frame, handle, services).await,
        models::COMMAND_ADD_USER => add_user(frame, handle, services).await,
        models::COMMAND_REMOVE_USER => remove_user(frame, handle, services).await,
        models::COMMAND_CREATE_ROOM => create_room(frame, handle, services).await,
        models::COMMAND_UPDATE_ROOM => update_room(frame, handle, services).await,
        models::COMMAND_DELETE_ROOM => delete_room(frame, handle, services).await,
        other => Err(AppError::Validation(format!("unrecognized command {other}"))),
    }
}

/// The local subscription-set check is a cheap defense on top of the service's own
/// room-type/membership authorization, against a client writing to a room it dropped.
async fn create_message(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    if !handle.is_subscribed(&frame.room_id) {
        return Err(AppError::Unauthorized("user is not in room".to_string()));
    }
    let user = services.db.find_user(&handle.user_id)?;
    let message = services
        .db
        .create_message(&frame.room_id, &user, &frame.text)?
        .with_author(Some(&user));
    broadcast(services, &frame.room_id, &message).await
}

async fn update_message(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    let message = services
        .db
        .update_message(&frame.target_id, &handle.user_id, &frame.text)?;
    let author = services.db.find_user(&handle.user_id).ok();
    let message = message.with_author(author.as_ref());
    broadcast(services, &message.room_id.clone(), &message).await
}

async fn delete_message(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    let message = services.db.delete_message(&frame.target_id, &handle.user_id)?;
    broadcast(services, &message.room_id.clone(), &message).await
}

/// Broadcasts on `global` rather than `roomId` so the added user receives the event
/// even if their session was not previously subscribed to the room.
async fn add_user(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    services
        .db
        .add_user_to_room(&frame.room_id, &frame.target_id, &handle.user_id)?;
    let message = services.db.synthesize_event_message(
        models::COMMAND_ADD_USER,
        &frame.room_id,
        &handle.user_id,
        &frame.target_id,
    )?;
    broadcast(services, models::CHANNEL_GLOBAL, &message).await
}

async fn remove_user(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    services
        .db
        .remove_user_from_room(&frame.room_id, &frame.target_id, &handle.user_id)?;
    let message = services.db.synthesize_event_message(
        models::COMMAND_REMOVE_USER,
        &frame.room_id,
        &handle.user_id,
        &frame.target_id,
    )?;
    broadcast(services, &frame.room_id, &message).await
}

/// `roomId` on the inbound frame is used as the new room's name; the service assigns
/// the durable identifier. The creator's own session adds that identifier to its
/// subscription set and reconnects, since the creator is not yet bus-subscribed to it.
async fn create_room(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    let room = services
        .db
        .create_room(&frame.room_id, &handle.user_id, RoomType::Private)?;
    handle.add_channel(room.id.clone()).await;
    let message = services.db.synthesize_event_message(
        models::COMMAND_CREATE_ROOM,
        &room.id,
        &handle.user_id,
        &room.id,
    )?;
    broadcast(services, &room.id, &message).await
}

async fn update_room(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    let name = if frame.text.is_empty() { None } else { Some(frame.text.as_str()) };
    services
        .db
        .update_room(&frame.room_id, &handle.user_id, name, None)?;
    let message = services.db.synthesize_event_message(
        models::COMMAND_UPDATE_ROOM,
        &frame.room_id,
        &handle.user_id,
        &frame.room_id,
    )?;
    broadcast(services, &frame.room_id, &message).await
}

/// Transient: the room no longer exists once deleted, so the event is not persisted.
/// Per the open question in the design notes, subscribers only receive it because
/// they were already listening at the moment of the broadcast.
async fn delete_room(
    frame: InboundFrame,
    handle: &SessionHandle,
    services: &Services,
) -> Result<(), AppError> {
    services.db.delete_room(&frame.room_id, &handle.user_id)?;
    let message = services.db.synthesize_event_message(
        models::COMMAND_DELETE_ROOM,
        &frame.room_id,
        &handle.user_id,
        &frame.room_id,
    )?;
    broadcast(services, &frame.room_id, &message).await
}
