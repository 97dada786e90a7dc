//! Integration tests for the Spyglass HTTP API: identity, rooms, bots and
//! offline sessions over real requests.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use spyglass::config::DevConfig;
use spyglass::prelude::*;
use spyglass_session::sign_init_data;

const TOKEN: &str = "424242:SPYGLASS-TEST";

// =========================================================================
// Helpers
// =========================================================================

/// Starts a server on a random port and returns its base URL.
async fn start_server(dev: DevConfig) -> String {
    let server = SpyglassServerBuilder::new()
        .bind("127.0.0.1:0")
        .dev_config(dev)
        .build(InitDataAuthenticator::new(TOKEN))
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr");

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the serve loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    format!("http://{addr}")
}

async fn start_default() -> String {
    start_server(DevConfig::default()).await
}

/// Signed credential for user `id`, named "Player {id}".
fn init(id: i64) -> String {
    let user = json!({
        "id": id,
        "first_name": "Player",
        "last_name": id.to_string(),
        "username": format!("player{id}"),
    })
    .to_string();
    sign_init_data(TOKEN, &[("auth_date", "1700000000"), ("user", &user)])
}

struct Api {
    base: String,
    client: reqwest::Client,
}

impl Api {
    fn new(base: String) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/api/{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request should send");
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn create(&self, owner: i64, limit: usize) -> String {
        let (status, body) = self
            .post(
                "room/create",
                json!({
                    "init_data": init(owner),
                    "format_mode": "online",
                    "play_mode": "standard",
                    "player_limit": limit,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {body}");
        body["room_code"].as_str().unwrap().to_string()
    }

    async fn room(&self, path: &str, user: i64, code: &str) -> (StatusCode, Value) {
        self.post(path, json!({ "init_data": init(user), "room_code": code }))
            .await
    }

    async fn offline(&self, path: &str, user: i64, session: &str) -> (StatusCode, Value) {
        self.post(path, json!({ "init_data": init(user), "session_id": session }))
            .await
    }
}

// =========================================================================
// Health and identity
// =========================================================================

#[tokio::test]
async fn test_health() {
    let base = start_default().await;
    let body: Value = reqwest::get(format!("{base}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_auth_returns_identity() {
    let api = Api::new(start_default().await);
    let (status, body) = api.post("auth", json!({ "initData": init(7) })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 7);
    assert_eq!(body["username"], "player7");
    assert_eq!(body["full_name"], "Player 7");
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let api = Api::new(start_default().await);
    let forged = init(7).replace("1700000000", "1700000001");
    let (status, body) = api.post("auth", json!({ "init_data": forged })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let api = Api::new(start_default().await);
    let (status, body) = api.post("room/create", json!({ "init_data": init(1) })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_four_player_round_over_http() {
    let api = Api::new(start_default().await);
    let code = api.create(1, 4).await;

    for id in 2..=3 {
        let (status, body) = api.room("room/join", id, &code).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["you_are_owner"], false);
        assert_eq!(body["can_start"], false);
    }
    let (_, owner_view) = api.room("room/status", 1, &code).await;
    assert_eq!(owner_view["can_start"], true);
    assert_eq!(owner_view["player_count"], 3);

    api.room("room/join", 4, &code).await;
    let (status, _) = api.room("room/join", 5, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = api.room("room/start", 2, &code).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, started) = api.room("room/start", 1, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["started"], true);
    let starter = started["starter_user_id"].as_i64().unwrap();
    assert!((1..=4).contains(&starter));

    let mut spies = 0;
    let mut cards = HashSet::new();
    for id in 1..=4 {
        let (status, role) = api.room("room/role", id, &code).await;
        assert_eq!(status, StatusCode::OK);
        match role["role"].as_str().unwrap() {
            "spy" => {
                spies += 1;
                assert!(role["card"].is_null());
            }
            _ => {
                cards.insert(role["card"].as_str().unwrap().to_string());
            }
        }
    }
    assert_eq!(spies, 1);
    assert_eq!(cards.len(), 1);

    let (status, _) = api.room("room/join", 9, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_rejects_bad_settings() {
    let api = Api::new(start_default().await);
    let (status, _) = api
        .post(
            "room/create",
            json!({
                "init_data": init(1),
                "format_mode": "online",
                "game_mode": "random",
                "random_allowed_modes": ["all_spies"],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            "room/create",
            json!({
                "init_data": init(1),
                "format_mode": "offline",
                "play_mode": "standard",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            "room/create",
            json!({
                "init_data": init(1),
                "format_mode": "online",
                "play_mode": "standard",
                "timer_enabled": true,
                "turn_time_seconds": 4,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_room_codes_are_normalized() {
    let api = Api::new(start_default().await);
    let code = api.create(1, 6).await;
    let messy = format!(" {}-{} ", code[..3].to_lowercase(), &code[3..]);
    let (status, body) = api.room("room/join", 2, &messy).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room_code"], code.as_str());
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let api = Api::new(start_default().await);
    let (status, body) = api.room("room/status", 1, "QQQQQQ").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_leave_transfers_ownership_then_closes() {
    let api = Api::new(start_default().await);
    let code = api.create(1, 6).await;
    api.room("room/join", 2, &code).await;

    let (status, left) = api.room("room/leave", 1, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(left, json!({ "left": true, "room_closed": false }));

    let (_, view) = api.room("room/status", 2, &code).await;
    assert_eq!(view["owner_user_id"], 2);
    assert_eq!(view["you_are_owner"], true);

    let (_, left) = api.room("room/leave", 2, &code).await;
    assert_eq!(left, json!({ "left": true, "room_closed": true }));

    let (status, _) = api.room("room/status", 2, &code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Leaving a room that is gone still succeeds.
    let (status, left) = api.room("room/leave", 2, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(left, json!({ "left": true, "room_closed": true }));
}

#[tokio::test]
async fn test_outsider_cannot_read_room() {
    let api = Api::new(start_default().await);
    let code = api.create(1, 6).await;
    let (status, _) = api.room("room/status", 99, &code).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, left) = api.room("room/leave", 99, &code).await;
    assert_eq!(left, json!({ "left": false, "room_closed": false }));
}

#[tokio::test]
async fn test_timed_round_turn_endpoints() {
    let api = Api::new(start_default().await);
    let (_, created) = api
        .post(
            "room/create",
            json!({
                "init_data": init(1),
                "format_mode": "online",
                "play_mode": "standard",
                "timer_enabled": true,
                "turn_time_seconds": 10,
            }),
        )
        .await;
    let code = created["room_code"].as_str().unwrap().to_string();
    assert_eq!(created["timer_enabled"], true);
    assert_eq!(created["turn_time_seconds"], 10);
    api.room("room/join", 2, &code).await;
    api.room("room/join", 3, &code).await;

    let (status, _) = api.room("room/turn/start", 1, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, started) = api.room("room/start", 1, &code).await;
    let (status, view) = api.room("room/turn/start", 1, &code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["turn_active"], true);
    assert_eq!(view["turn_state"], "turn_loop_active");
    assert_eq!(view["current_turn_user_id"], started["starter_user_id"]);

    let (_, view) = api.room("room/heartbeat", 2, &code).await;
    assert!(view["turn_remaining_ms"].as_u64().unwrap() <= 10_000);

    let (_, view) = api.room("room/turn/finish", 1, &code).await;
    assert_eq!(view["turns_completed"], true);

    let (_, view) = api.room("room/finish", 1, &code).await;
    assert_eq!(view["state"], "finished");

    let (_, view) = api.room("room/lobby", 1, &code).await;
    assert_eq!(view["state"], "waiting");
    assert_eq!(view["player_count"], 3);
}

// =========================================================================
// Bots (dev tools)
// =========================================================================

fn dev_tools(admin: i64) -> DevConfig {
    DevConfig {
        tools_enabled: true,
        admin_ids: vec![admin],
        admin_usernames: Vec::new(),
    }
}

#[tokio::test]
async fn test_dev_admin_manages_bots() {
    let api = Api::new(start_server(dev_tools(1)).await);
    let code = api.create(1, 6).await;

    let (status, view) = api
        .post(
            "room/bots/add",
            json!({ "init_data": init(1), "room_code": code, "count": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["player_count"], 3);
    assert_eq!(view["can_manage_bots"], true);
    assert_eq!(view["players"][1]["display_name"], "Bot 1");
    assert_eq!(view["players"][1]["is_bot"], true);

    let (_, view) = api.room("room/bots/fill", 1, &code).await;
    assert_eq!(view["player_count"], 6);

    let (status, _) = api.room("room/start", 1, &code).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = api.room("room/bots/clear", 1, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, view) = api.room("room/lobby", 1, &code).await;
    assert_eq!(view["can_manage_bots"], true);
    let (_, view) = api.room("room/bots/clear", 1, &code).await;
    assert_eq!(view["player_count"], 1);
    assert_eq!(view["status_message"], "Removed 5 bots");
}

#[tokio::test]
async fn test_bots_need_dev_admin() {
    let api = Api::new(start_server(dev_tools(1)).await);
    let code = api.create(2, 6).await;
    let (_, view) = api.room("room/status", 2, &code).await;
    assert_eq!(view["can_manage_bots"], false);
    let (status, _) = api.room("room/bots/fill", 2, &code).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bots_hidden_without_dev_tools() {
    let api = Api::new(start_default().await);
    let code = api.create(1, 6).await;
    let (status, _) = api.room("room/bots/fill", 1, &code).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =========================================================================
// Offline sessions
// =========================================================================

#[tokio::test]
async fn test_offline_pass_around_flow() {
    let api = Api::new(start_default().await);
    let (status, started) = api
        .post(
            "offline/start",
            json!({
                "init_data": init(1),
                "play_mode": "standard",
                "player_count": 3,
                "timer_enabled": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["current_player_number"], 1);
    assert_eq!(started["turn_time_seconds"], 8);
    let session = started["session_id"].as_str().unwrap().to_string();

    let (status, _) = api.offline("offline/reveal", 2, &session).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = api.offline("offline/turn/start", 1, &session).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut spies = 0;
    for seat in 1..=3 {
        let (_, revealed) = api.offline("offline/reveal", 1, &session).await;
        assert_eq!(revealed["player_number"], seat);
        if revealed["role"] == "spy" {
            spies += 1;
        }
        let (_, closed) = api.offline("offline/close", 1, &session).await;
        assert_eq!(closed["finished"], seat == 3);
    }
    assert_eq!(spies, 1);

    let (_, closed) = api.offline("offline/close", 1, &session).await;
    let starter = closed["starter_player_number"].as_u64().unwrap();
    assert!((1..=3).contains(&starter));

    let (status, turn) = api.offline("offline/turn/start", 1, &session).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turn["turn_active"], true);
    assert_eq!(turn["current_player_number"], starter);

    let (_, turn) = api.offline("offline/turn/finish", 1, &session).await;
    assert_eq!(turn["turns_completed"], true);
    let (_, turn) = api.offline("offline/turn/status", 1, &session).await;
    assert_eq!(turn["turn_state"], "finished");

    let (_, restarted) = api.offline("offline/restart", 1, &session).await;
    assert_eq!(restarted["session_id"], session.as_str());
    assert_eq!(restarted["current_player_number"], 1);
}

#[tokio::test]
async fn test_configured_image_base_reaches_revealed_cards() {
    let mut config = ServerConfig::default();
    config.listen_addr = "127.0.0.1:0".into();
    config.cards.image_base_url = Some("https://img.example/cards/".into());
    let server = SpyglassServerBuilder::from_config(&config)
        .expect("config should load")
        .build(InitDataAuthenticator::new(TOKEN))
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("should have local addr");
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let api = Api::new(format!("http://{addr}"));
    let (_, started) = api
        .post(
            "offline/start",
            json!({ "init_data": init(1), "play_mode": "standard", "player_count": 3 }),
        )
        .await;
    let session = started["session_id"].as_str().unwrap().to_string();

    let mut images = 0;
    for _ in 1..=3 {
        let (_, revealed) = api.offline("offline/reveal", 1, &session).await;
        if revealed["role"] == "card" {
            let url = revealed["image_url"].as_str().unwrap();
            assert!(url.starts_with("https://img.example/cards/"), "{url}");
            assert!(url.ends_with(".png"));
            images += 1;
        } else {
            assert!(revealed["image_url"].is_null());
        }
        api.offline("offline/close", 1, &session).await;
    }
    assert_eq!(images, 2);
}

#[tokio::test]
async fn test_offline_errors() {
    let api = Api::new(start_default().await);
    let (status, _) = api.offline("offline/reveal", 1, "does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = api
        .post(
            "offline/start",
            json!({ "init_data": init(1), "play_mode": "standard", "player_count": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
