//! Request and response bodies of the HTTP API.
//!
//! Every request carries the caller's raw `init_data` credential (clients
//! historically send it as `initData`, so both spellings are accepted).
//! Responses are sanitised snapshots: nothing in this module can hold a
//! role assignment for anyone but the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    FormatMode, LifecycleState, PlayMode, RoleCard, RoomCode, Scenario, SessionId,
    TurnState, UserId,
};

/// Largest room allowed, and the default limit for new rooms.
pub const MAX_PLAYERS: usize = 12;

/// Fewest players a round can be dealt for.
pub const MIN_PLAYERS: usize = 3;

fn default_player_limit() -> usize {
    MAX_PLAYERS
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `/api/auth`: just the credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreateRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
    pub format_mode: FormatMode,
    #[serde(alias = "game_mode")]
    pub play_mode: PlayMode,
    #[serde(default)]
    pub random_allowed_modes: Option<Vec<Scenario>>,
    #[serde(default = "default_player_limit")]
    pub player_limit: usize,
    #[serde(default)]
    pub timer_enabled: bool,
    #[serde(default)]
    pub turn_time_seconds: Option<u32>,
}

/// Body shared by every room endpoint that only names a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomActionRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
    pub room_code: RoomCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomBotsAddRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
    pub room_code: RoomCode,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineStartRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
    #[serde(alias = "game_mode")]
    pub play_mode: PlayMode,
    pub player_count: usize,
    #[serde(default)]
    pub random_allowed_modes: Option<Vec<Scenario>>,
    #[serde(default)]
    pub timer_enabled: bool,
    #[serde(default)]
    pub turn_time_seconds: Option<u32>,
}

/// Body shared by every offline endpoint after `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineActionRequest {
    #[serde(alias = "initData")]
    pub init_data: String,
    pub session_id: SessionId,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: UserId,
    pub username: Option<String>,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPlayer {
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    /// False while the player is marked departed.
    pub is_present: bool,
}

/// A room as one particular caller is allowed to see it.
///
/// `you_are_owner`, `can_start` and `can_manage_bots` are relative to the
/// caller, so two players polling the same room get different snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_code: RoomCode,
    pub owner_user_id: UserId,
    pub owner_name: String,
    /// Same as `owner_name`; older clients read this one.
    pub host_name: String,
    pub format_mode: FormatMode,
    pub play_mode: PlayMode,
    pub players: Vec<RoomPlayer>,
    pub player_count: usize,
    pub player_limit: usize,
    pub state: LifecycleState,
    pub can_start: bool,
    pub you_are_owner: bool,
    pub starter_user_id: Option<UserId>,
    pub starter_name: Option<String>,
    pub timer_enabled: bool,
    pub turn_time_seconds: Option<u32>,
    pub turn_active: bool,
    pub turn_state: TurnState,
    pub current_turn_index: Option<usize>,
    pub current_turn_user_id: Option<UserId>,
    pub current_turn_name: Option<String>,
    pub turn_started_at: Option<DateTime<Utc>>,
    pub turn_remaining_ms: Option<u64>,
    pub turns_completed: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub status_message: Option<String>,
    pub can_manage_bots: bool,
}

/// Reply to `room/start` and `room/restart`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub started: bool,
    pub starter_user_id: UserId,
    pub starter_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub left: bool,
    pub room_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineStartResponse {
    pub session_id: SessionId,
    pub current_player_number: usize,
    pub player_count: usize,
    pub timer_enabled: bool,
    pub turn_time_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineRevealResponse {
    pub player_number: usize,
    #[serde(flatten)]
    pub role: RoleCard,
}

/// Reply to `offline/close`: either the next number to hand the device
/// to, or the starter once everybody has seen their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineCloseResponse {
    pub finished: bool,
    pub current_player_number: Option<usize>,
    pub starter_player_number: Option<usize>,
}

/// Turn-loop snapshot of an offline session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineTurnStatus {
    pub timer_enabled: bool,
    pub turn_time_seconds: Option<u32>,
    pub turn_active: bool,
    pub turn_state: TurnState,
    pub current_turn_index: Option<usize>,
    pub current_player_number: Option<usize>,
    pub turn_started_at: Option<DateTime<Utc>>,
    pub turn_remaining_ms: Option<u64>,
    pub turns_completed: bool,
}
