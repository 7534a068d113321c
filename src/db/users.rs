use rusqlite::{OptionalExtension, params};

use crate::db::{Db, new_id, now_rfc3339};
use crate::error::AppError;
use crate::models::User;

fn row_to_user(conn: &rusqlite::Connection, id: &str) -> Result<User, AppError> {
    let (email, first_name, last_name, online, created_at) = conn
        .query_row(
            "SELECT email, first_name, last_name, online, created_at FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1")?;
    let roles = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(User {
        id: id.to_string(),
        email,
        first_name,
        last_name,
        online,
        roles,
        created_at,
    })
}

impl Db {
    /// `FindUserWithRooms` — returns the user plus the room ids they belong to, used at
    /// socket admission to seed the initial subscription set.
    pub fn find_user_with_rooms(&self, user_id: &str) -> Result<(User, Vec<String>), AppError> {
        let conn = self.conn.lock().unwrap();
        let user = row_to_user(&conn, user_id)?;
        let mut stmt = conn.prepare("SELECT room_id FROM room_members WHERE user_id = ?1")?;
        let rooms = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((user, rooms))
    }

    pub fn find_user(&self, user_id: &str) -> Result<User, AppError> {
        let conn = self.conn.lock().unwrap();
        row_to_user(&conn, user_id)
    }

    pub fn register_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AppError> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "a user with email {email} already exists"
            )));
        }

        let id = new_id();
        let created_at = now_rfc3339();
        conn.execute(
            "INSERT INTO users (id, email, first_name, last_name, online, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![id, email, first_name, last_name, created_at],
        )?;
        Ok(User {
            id,
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            online: false,
            roles: Vec::new(),
            created_at,
        })
    }

    pub fn set_user_online(&self, user_id: &str, online: bool) -> Result<(), AppError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET online = ?1 WHERE id = ?2",
            params![online, user_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_find_user() {
        let db = Db::open_in_memory();
        let user = db.register_user("a@example.com", "Ada", "Lovelace").unwrap();
        let (found, rooms) = db.find_user_with_rooms(&user.id).unwrap();
        assert_eq!(found.email, "a@example.com");
        assert!(rooms.is_empty());
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let db = Db::open_in_memory();
        db.register_user("a@example.com", "Ada", "Lovelace").unwrap();
        let err = db
            .register_user("a@example.com", "Ada", "Lovelace")
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn set_user_online_round_trips() {
        let db = Db::open_in_memory();
        let user = db.register_user("a@example.com", "Ada", "Lovelace").unwrap();
        db.set_user_online(&user.id, true).unwrap();
        assert!(db.find_user(&user.id).unwrap().online);
        db.set_user_online(&user.id, false).unwrap();
        assert!(!db.find_user(&user.id).unwrap().online);
    }
}
