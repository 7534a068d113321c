pub mod auth;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bus::Bus;
use bus::memory::MemoryBus;
use bus::redis::RedisBus;
use config::Config;
use db::Db;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub bus: Arc<dyn Bus>,
    pub config: Arc<Config>,
}

/// Builds the bus backend indicated by configuration: Redis when `BUS_URL` is set,
/// otherwise the single-process in-memory bus.
pub fn build_bus(config: &Config) -> Arc<dyn Bus> {
    match &config.bus_url {
        Some(url) => {
            info!("using redis bus");
            Arc::new(RedisBus::new(url).expect("failed to construct redis bus"))
        }
        None => {
            info!("using in-process memory bus (single replica)");
            Arc::new(MemoryBus::new())
        }
    }
}

pub fn build_app(config: Config) -> Router {
    let db = Arc::new(Db::new(&config.database_path));
    db.bootstrap_reserved_rooms(&config)
        .expect("failed to bootstrap reserved rooms");
    let bus = build_bus(&config);
    build_app_with(db, bus, Arc::new(config))
}

pub fn build_app_with(db: Arc<Db>, bus: Arc<dyn Bus>, config: Arc<Config>) -> Router {
    let state = AppState { db, bus, config };

    routes::router()
        .route("/api/ws", axum::routing::get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
