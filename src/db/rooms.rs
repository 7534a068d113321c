use rusqlite::{OptionalExtension, params};

use crate::db::{Db, new_id, now_rfc3339};
use crate::error::AppError;
use crate::models::{Room, RoomType};

fn row_to_room(conn: &rusqlite::Connection, id: &str) -> Result<Room, AppError> {
    let (name, owner_id, room_type, created_at, updated_at) = conn
        .query_row(
            "SELECT name, owner_id, room_type, created_at, updated_at FROM rooms WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("room {id} not found")))?;

    let mut stmt = conn.prepare("SELECT user_id FROM room_members WHERE room_id = ?1")?;
    let members = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Room {
        id: id.to_string(),
        name,
        owner_id,
        room_type: RoomType::from_str(&room_type)
            .ok_or_else(|| AppError::Fatal(format!("invalid room_type {room_type}")))?,
        members,
        created_at,
        updated_at,
    })
}

impl Db {
    pub fn find_room(&self, room_id: &str) -> Result<Room, AppError> {
        let conn = self.conn.lock().unwrap();
        row_to_room(&conn, room_id)
    }

    /// `VerifyUserInRoom`
    pub fn verify_user_in_room(&self, room_id: &str, user_id: &str) -> Result<(), AppError> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM room_members WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => {
                let room_exists: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM rooms WHERE id = ?1",
                        params![room_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if room_exists.is_none() {
                    Err(AppError::NotFound(format!("room {room_id} not found")))
                } else {
                    Err(AppError::Unauthorized("user is not in room".to_string()))
                }
            }
        }
    }

    pub fn create_room(
        &self,
        name: &str,
        owner_id: &str,
        room_type: RoomType,
    ) -> Result<Room, AppError> {
        if name.is_empty() {
            return Err(AppError::Validation("room name must not be empty".to_string()));
        }
        let conn = self.conn.lock().unwrap();
        let id = new_id();
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO rooms (id, name, owner_id, room_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, name, owner_id, room_type.as_str(), now],
        )?;
        conn.execute(
            "INSERT INTO room_members (room_id, user_id) VALUES (?1, ?2)",
            params![id, owner_id],
        )?;
        drop(conn);
        self.find_room(&id)
    }

    pub fn update_room(
        &self,
        room_id: &str,
        actor_id: &str,
        name: Option<&str>,
        room_type: Option<RoomType>,
    ) -> Result<Room, AppError> {
        let room = self.find_room(room_id)?;
        if room.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "only the room owner may update the room".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        let now = now_rfc3339();
        if let Some(name) = name {
            conn.execute(
                "UPDATE rooms SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, room_id],
            )?;
        }
        if let Some(room_type) = room_type {
            conn.execute(
                "UPDATE rooms SET room_type = ?1, updated_at = ?2 WHERE id = ?3",
                params![room_type.as_str(), now, room_id],
            )?;
        }
        drop(conn);
        self.find_room(room_id)
    }

    pub fn delete_room(&self, room_id: &str, actor_id: &str) -> Result<Room, AppError> {
        let room = self.find_room(room_id)?;
        if room.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "only the room owner may delete the room".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM rooms WHERE id = ?1", params![room_id])?;
        Ok(room)
    }

    /// Only the room owner may invoke; refuses if `target_user_id` is already a member.
    pub fn add_user_to_room(
        &self,
        room_id: &str,
        target_user_id: &str,
        actor_id: &str,
    ) -> Result<(), AppError> {
        let room = self.find_room(room_id)?;
        if room.owner_id != actor_id {
            return Err(AppError::Forbidden(
                "only the room owner may add members".to_string(),
            ));
        }
        if room.members.iter().any(|m| m == target_user_id) {
            return Err(AppError::Conflict(format!(
                "user {target_user_id} is already a member"
            )));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO room_members (room_id, user_id) VALUES (?1, ?2)",
            params![room_id, target_user_id],
        )?;
        Ok(())
    }

    /// Owner may remove anyone except themselves; any non-owner member may remove only themselves.
    pub fn remove_user_from_room(
        &self,
        room_id: &str,
        target_user_id: &str,
        actor_id: &str,
    ) -> Result<(), AppError> {
        let room = self.find_room(room_id)?;
        let is_owner = room.owner_id == actor_id;
        if is_owner && target_user_id == actor_id {
            return Err(AppError::Forbidden(
                "the room owner cannot remove themselves".to_string(),
            ));
        }
        if !is_owner && target_user_id != actor_id {
            return Err(AppError::Forbidden(
                "only the room owner may remove other members".to_string(),
            ));
        }
        if !room.members.iter().any(|m| m == target_user_id) {
            return Err(AppError::NotFound(format!(
                "user {target_user_id} is not a member"
            )));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, target_user_id],
        )?;
        Ok(())
    }

    /// Checks whether `user_id` may write a CreateMessage into `room`, per room-type rules.
    pub fn authorize_write(&self, room: &Room, user: &crate::models::User) -> Result<(), AppError> {
        match room.room_type {
            RoomType::Private => {
                if room.members.iter().any(|m| m == &user.id) {
                    Ok(())
                } else {
                    Err(AppError::Unauthorized("user is not in room".to_string()))
                }
            }
            RoomType::Public => Ok(()),
            RoomType::ReadOnly => {
                if user.is_admin() {
                    Ok(())
                } else {
                    Err(AppError::Forbidden(
                        "only admins may write to this room".to_string(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Db, crate::models::User) {
        let db = Db::open_in_memory();
        let owner = db.register_user("owner@example.com", "O", "Wner").unwrap();
        (db, owner)
    }

    #[test]
    fn create_room_adds_owner_as_member() {
        let (db, owner) = setup();
        let room = db.create_room("r1", &owner.id, RoomType::Private).unwrap();
        assert_eq!(room.members, vec![owner.id.clone()]);
    }

    #[test]
    fn add_then_remove_user_restores_member_set() {
        let (db, owner) = setup();
        let other = db.register_user("o@example.com", "O", "ther").unwrap();
        let room = db.create_room("r1", &owner.id, RoomType::Private).unwrap();
        db.add_user_to_room(&room.id, &other.id, &owner.id).unwrap();
        let after_add = db.find_room(&room.id).unwrap();
        assert_eq!(after_add.members.len(), 2);

        db.remove_user_from_room(&room.id, &other.id, &other.id)
            .unwrap();
        let after_remove = db.find_room(&room.id).unwrap();
        assert_eq!(after_remove.members, room.members);
    }

    #[test]
    fn add_user_already_member_is_conflict() {
        let (db, owner) = setup();
        let room = db.create_room("r1", &owner.id, RoomType::Private).unwrap();
        let err = db
            .add_user_to_room(&room.id, &owner.id, &owner.id)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn non_owner_cannot_remove_others() {
        let (db, owner) = setup();
        let other = db.register_user("o@example.com", "O", "ther").unwrap();
        let third = db.register_user("t@example.com", "T", "hird").unwrap();
        let room = db.create_room("r1", &owner.id, RoomType::Private).unwrap();
        db.add_user_to_room(&room.id, &other.id, &owner.id).unwrap();
        db.add_user_to_room(&room.id, &third.id, &owner.id).unwrap();

        let err = db
            .remove_user_from_room(&room.id, &third.id, &other.id)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
