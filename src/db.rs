pub mod messages;
pub mod rooms;
pub mod users;

use rusqlite::Connection;
use std::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path).expect("failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    pub fn open_in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("failed to open in-memory database");
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                online INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                PRIMARY KEY (user_id, role)
            );

            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL REFERENCES users(id),
                room_type TEXT NOT NULL CHECK (room_type IN ('Private', 'Public', 'ReadOnly')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                command TEXT NOT NULL,
                target_id TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_messages_room_created ON messages(room_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_room_members_user ON room_members(user_id);",
        )
        .expect("failed to run migrations");
    }

    /// Inserts the two reserved rooms (general/Public, announcements/ReadOnly) and a
    /// synthetic `system` owner user if they are not already present.
    pub fn bootstrap_reserved_rooms(&self, cfg: &Config) -> Result<(), AppError> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT OR IGNORE INTO users (id, email, first_name, last_name, online, created_at)
             VALUES ('system', 'system@local', 'System', '', 0, ?1)",
            rusqlite::params![now],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES ('system', 'admin')",
            [],
        )?;

        for (id, name, room_type) in [
            (&cfg.general_room_id, "general", "Public"),
            (&cfg.announcements_room_id, "announcements", "ReadOnly"),
        ] {
            conn.execute(
                "INSERT OR IGNORE INTO rooms (id, name, owner_id, room_type, created_at, updated_at)
                 VALUES (?1, ?2, 'system', ?3, ?4, ?4)",
                rusqlite::params![id, name, room_type, now],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO room_members (room_id, user_id) VALUES (?1, 'system')",
                rusqlite::params![id],
            )?;
        }
        info!(general = %cfg.general_room_id, announcements = %cfg.announcements_room_id, "reserved rooms bootstrapped");
        Ok(())
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
