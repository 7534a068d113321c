use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use room_relay::bus::memory::MemoryBus;
use room_relay::config::Config;
use room_relay::db::Db;
use room_relay::models::{Message, Room};
use room_relay::build_app_with;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        database_path: ":memory:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        bus_url: None,
        jwt_secret: "test-secret".to_string(),
        token_lifespan_hours: 1,
        general_room_id: "general".to_string(),
        announcements_room_id: "announcements".to_string(),
        pong_wait_secs: 60,
    }
}

/// Builds a fresh in-memory app plus a registered user id to act as, mirroring
/// `build_app` without touching disk or a real Redis instance.
fn test_app() -> (Router, Arc<Db>, String) {
    let config = test_config();
    let db = Arc::new(Db::open_in_memory());
    db.bootstrap_reserved_rooms(&config).unwrap();
    let user = db.register_user("a@example.com", "Ada", "Lovelace").unwrap();
    let bus: Arc<dyn room_relay::bus::Bus> = Arc::new(MemoryBus::new());
    let config = Arc::new(config);
    let app = build_app_with(db.clone(), bus, config);
    (app, db, user.id)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (app, _db, _user) = test_app();
    let response = app
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_room_then_fetch_round_trips() {
    let (app, _db, user_id) = test_app();

    let create = Request::post("/api/v1/rooms")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "name": "watercooler" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created: Room = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(created.name, "watercooler");
    assert_eq!(created.owner_id, user_id);

    let get = Request::get(format!("/api/v1/rooms/{}", created.id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched: Room = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn create_room_rejects_missing_actor_header() {
    let (app, _db, _user) = test_app();
    let create = Request::post("/api/v1/rooms")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "no-actor" }).to_string()))
        .unwrap();
    let response = app.oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_message_then_list_returns_it() {
    let (app, _db, user_id) = test_app();

    let create_room = Request::post("/api/v1/rooms")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "name": "team" }).to_string()))
        .unwrap();
    let room: Room = serde_json::from_value(
        json_body(app.clone().oneshot(create_room).await.unwrap()).await,
    )
    .unwrap();

    let post_message = Request::post(format!("/api/v1/rooms/{}/messages", room.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "text": "hello team" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(post_message).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let posted: Message = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(posted.text, "hello team");

    let list = Request::get(format!("/api/v1/rooms/{}/messages", room.id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(list).await.unwrap();
    let messages: Vec<Message> = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, posted.id);
}

#[tokio::test]
async fn update_message_by_non_author_is_forbidden() {
    let (app, db, user_id) = test_app();
    let other = db.register_user("b@example.com", "B", "Ob").unwrap();

    let create_room = Request::post("/api/v1/rooms")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "name": "team" }).to_string()))
        .unwrap();
    let room: Room = serde_json::from_value(
        json_body(app.clone().oneshot(create_room).await.unwrap()).await,
    )
    .unwrap();

    let post_message = Request::post(format!("/api/v1/rooms/{}/messages", room.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "text": "mine" }).to_string()))
        .unwrap();
    let posted: Message = serde_json::from_value(
        json_body(app.clone().oneshot(post_message).await.unwrap()).await,
    )
    .unwrap();

    let update = Request::patch(format!("/api/v1/messages/{}", posted.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &other.id)
        .body(Body::from(json!({ "text": "edited" }).to_string()))
        .unwrap();
    let response = app.oneshot(update).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn add_member_twice_is_conflict() {
    let (app, db, user_id) = test_app();
    let invitee = db.register_user("c@example.com", "C", "Ee").unwrap();

    let create_room = Request::post("/api/v1/rooms")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "name": "team" }).to_string()))
        .unwrap();
    let room: Room = serde_json::from_value(
        json_body(app.clone().oneshot(create_room).await.unwrap()).await,
    )
    .unwrap();

    let add_member = Request::post(format!("/api/v1/rooms/{}/members", room.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "userId": invitee.id }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(add_member).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let add_member_again = Request::post(format!("/api/v1/rooms/{}/members", room.id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-User-Id", &user_id)
        .body(Body::from(json!({ "userId": invitee.id }).to_string()))
        .unwrap();
    let response = app.oneshot(add_member_again).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
