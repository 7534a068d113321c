use clap::Parser;

/// Runtime configuration, loaded from environment variables (optionally via a `.env` file).
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "data/chat.db")]
    pub database_path: String,

    /// TCP address the HTTP/WebSocket server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Redis connection URL for cross-replica fan-out. When unset, an in-process
    /// bus is used and fan-out is limited to sessions on this replica.
    #[arg(long, env = "BUS_URL")]
    pub bus_url: Option<String>,

    /// HMAC signing secret for session bearer tokens.
    #[arg(long, env = "JWT_SECRET", default_value = "dev-secret-change-me")]
    pub jwt_secret: String,

    /// Token lifespan in hours, used when minting tokens for tests/bootstrap.
    #[arg(long, env = "TOKEN_LIFESPAN_HOURS", default_value_t = 24)]
    pub token_lifespan_hours: i64,

    /// Identifier of the reserved Public "general" room.
    #[arg(long, env = "GENERAL_ROOM_ID", default_value = "general")]
    pub general_room_id: String,

    /// Identifier of the reserved ReadOnly "announcements" room.
    #[arg(long, env = "ANNOUNCEMENTS_ROOM_ID", default_value = "announcements")]
    pub announcements_room_id: String,

    /// Pong-wait liveness timeout in seconds.
    #[arg(long, env = "PONG_WAIT_SECS", default_value_t = 60)]
    pub pong_wait_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Config::parse()
    }

    pub fn ping_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.pong_wait_secs as f64 * 0.9)
    }

    pub fn pong_wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pong_wait_secs)
    }
}
