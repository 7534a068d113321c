use rusqlite::{OptionalExtension, params};

use crate::db::{Db, new_id, now_rfc3339};
use crate::error::AppError;
use crate::models::Message;

fn row_to_message(conn: &rusqlite::Connection, id: &str) -> Result<Message, AppError> {
    conn.query_row(
        "SELECT id, created_at, room_id, user_id, text, command, target_id
         FROM messages WHERE id = ?1",
        params![id],
        |row| {
            Ok(Message {
                id: row.get(0)?,
                created_at: row.get(1)?,
                room_id: row.get(2)?,
                user_id: row.get(3)?,
                text: row.get(4)?,
                command: row.get(5)?,
                target_id: row.get(6)?,
                user: None,
            })
        },
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("message {id} not found")))
}

impl Db {
    pub fn find_message(&self, message_id: &str) -> Result<Message, AppError> {
        let conn = self.conn.lock().unwrap();
        row_to_message(&conn, message_id)
    }

    pub fn list_messages(&self, room_id: &str, limit: i64) -> Result<Vec<Message>, AppError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, room_id, user_id, text, command, target_id
             FROM messages WHERE room_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![room_id, limit], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    room_id: row.get(2)?,
                    user_id: row.get(3)?,
                    text: row.get(4)?,
                    command: row.get(5)?,
                    target_id: row.get(6)?,
                    user: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_message(
        &self,
        room_id: &str,
        user_id: &str,
        text: &str,
        command: &str,
        target_id: &str,
    ) -> Result<Message, AppError> {
        let conn = self.conn.lock().unwrap();
        let room_exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM rooms WHERE id = ?1",
                params![room_id],
                |row| row.get(0),
            )
            .optional()?;
        if room_exists.is_none() {
            return Err(AppError::NotFound(format!("room {room_id} not found")));
        }
        let id = new_id();
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO messages (id, created_at, room_id, user_id, text, command, target_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, created_at, room_id, user_id, text, command, target_id],
        )?;
        Ok(Message {
            id,
            created_at,
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            command: command.to_string(),
            target_id: target_id.to_string(),
            user: None,
        })
    }

    /// Performs read/write authorization against room-type and membership, then persists.
    pub fn create_message(
        &self,
        room_id: &str,
        user: &crate::models::User,
        text: &str,
    ) -> Result<Message, AppError> {
        if text.is_empty() || text.chars().count() > 500 {
            return Err(AppError::Validation(
                "text must be 1..500 characters".to_string(),
            ));
        }
        let room = self.find_room(room_id)?;
        self.authorize_write(&room, user)?;
        self.insert_message(
            room_id,
            &user.id,
            text,
            crate::models::COMMAND_CREATE_MESSAGE,
            room_id,
        )
    }

    /// Only the author may update.
    pub fn update_message(
        &self,
        message_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Message, AppError> {
        if text.chars().count() > 500 {
            return Err(AppError::Validation("text must be at most 500 characters".to_string()));
        }
        let message = self.find_message(message_id)?;
        if message.user_id != user_id {
            return Err(AppError::Forbidden(
                "only the author may update this message".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET text = ?1, command = ?2 WHERE id = ?3",
            params![text, crate::models::COMMAND_UPDATE_MESSAGE, message_id],
        )?;
        drop(conn);
        self.find_message(message_id)
    }

    /// Marks deleted (empty text), only by author.
    pub fn delete_message(&self, message_id: &str, user_id: &str) -> Result<Message, AppError> {
        let message = self.find_message(message_id)?;
        if message.user_id != user_id {
            return Err(AppError::Forbidden(
                "only the author may delete this message".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET text = '', command = ?1 WHERE id = ?2",
            params![crate::models::COMMAND_DELETE_MESSAGE, message_id],
        )?;
        drop(conn);
        self.find_message(message_id)
    }

    /// Persists a system message carrying a non-content command tag (e.g. `AddUser`) so
    /// history shows membership and room-lifecycle changes. `DeleteRoom` is transient:
    /// the room no longer exists so there is nothing to persist against.
    pub fn synthesize_event_message(
        &self,
        kind: &str,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<Message, AppError> {
        if kind == crate::models::COMMAND_DELETE_ROOM {
            return Ok(Message {
                id: new_id(),
                created_at: now_rfc3339(),
                room_id: room_id.to_string(),
                user_id: actor_id.to_string(),
                text: String::new(),
                command: kind.to_string(),
                target_id: target_id.to_string(),
                user: None,
            });
        }
        self.insert_message(room_id, actor_id, "", kind, target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomType;

    fn setup() -> (Db, crate::models::User, crate::models::Room) {
        let db = Db::open_in_memory();
        let user = db.register_user("a@example.com", "A", "B").unwrap();
        let room = db.create_room("r1", &user.id, RoomType::Public).unwrap();
        (db, user, room)
    }

    #[test]
    fn create_and_fetch_message_round_trips() {
        let (db, user, room) = setup();
        let msg = db.create_message(&room.id, &user, "hi").unwrap();
        let fetched = db.find_message(&msg.id).unwrap();
        assert_eq!(fetched.text, "hi");
        assert_eq!(fetched.room_id, room.id);
        assert_eq!(fetched.command, crate::models::COMMAND_CREATE_MESSAGE);
    }

    #[test]
    fn empty_text_rejected_for_create() {
        let (db, user, room) = setup();
        let err = db.create_message(&room.id, &user, "").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn text_over_500_rejected() {
        let (db, user, room) = setup();
        let text = "x".repeat(501);
        let err = db.create_message(&room.id, &user, &text).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn text_exactly_500_accepted() {
        let (db, user, room) = setup();
        let text = "x".repeat(500);
        let msg = db.create_message(&room.id, &user, &text).unwrap();
        assert_eq!(msg.text.chars().count(), 500);
    }

    #[test]
    fn only_author_can_update() {
        let (db, user, room) = setup();
        let other = db.register_user("c@example.com", "C", "D").unwrap();
        let msg = db.create_message(&room.id, &user, "hi").unwrap();
        let err = db.update_message(&msg.id, &other.id, "edited").unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn delete_message_empties_text() {
        let (db, user, room) = setup();
        let msg = db.create_message(&room.id, &user, "hi").unwrap();
        let deleted = db.delete_message(&msg.id, &user.id).unwrap();
        assert_eq!(deleted.text, "");
        assert_eq!(deleted.command, crate::models::COMMAND_DELETE_MESSAGE);
    }
}
