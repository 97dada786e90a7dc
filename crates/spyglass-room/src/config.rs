//! Room settings (per room, chosen by the creator) and registry
//! configuration (server-wide).

use std::time::Duration;

use spyglass_clock::TurnTimer;
use spyglass_protocol::{
    FormatMode, MAX_PLAYERS, MIN_PLAYERS, PlayMode, RoomCreateRequest, Scenario,
};
use spyglass_roles::{RoleError, allowed_scenarios};

use crate::RoomError;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Server-wide settings shared by every room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// A player silent for longer than this is treated as having left.
    /// Zero disables stale eviction. Never applied in the lobby.
    pub stale_after: Duration,

    /// Lobbies that saw no command for longer than this are shut down by
    /// the next sweep.
    pub waiting_ttl: Duration,

    /// How many random codes to try before giving up on `create`.
    pub code_attempts: u32,

    /// Bound of each room actor's command channel.
    pub channel_size: usize,

    /// Log registry lookups with a preview of the stored codes.
    pub room_debug: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(20),
            waiting_ttl: Duration::from_secs(60 * 60),
            code_attempts: 8,
            channel_size: 64,
            room_debug: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Validated settings of one room, fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    pub play_mode: PlayMode,
    /// Scenarios a random-mode round may draw. Empty in standard mode.
    pub allowed_scenarios: Vec<Scenario>,
    pub player_limit: usize,
    pub timer: Option<TurnTimer>,
}

impl RoomSettings {
    pub fn new(
        play_mode: PlayMode,
        player_limit: usize,
        random_allowed_modes: Option<&[Scenario]>,
        timer_enabled: bool,
        turn_time_seconds: Option<u32>,
    ) -> Result<Self, RoomError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&player_limit) {
            return Err(RoomError::Validation(format!(
                "player limit must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            )));
        }
        let allowed_scenarios =
            allowed_scenarios(play_mode, random_allowed_modes).map_err(|e| match e {
                RoleError::Configuration(msg) => RoomError::Validation(msg),
                other => RoomError::Roles(other),
            })?;
        let timer = TurnTimer::from_settings(timer_enabled, turn_time_seconds)?;
        Ok(Self {
            play_mode,
            allowed_scenarios,
            player_limit,
            timer,
        })
    }

    /// Settings from a `room/create` body. Rooms are online only.
    pub fn from_request(request: &RoomCreateRequest) -> Result<Self, RoomError> {
        if request.format_mode != FormatMode::Online {
            return Err(RoomError::Validation("rooms are online only".into()));
        }
        Self::new(
            request.play_mode,
            request.player_limit,
            request.random_allowed_modes.as_deref(),
            request.timer_enabled,
            request.turn_time_seconds,
        )
    }

    pub fn timer_enabled(&self) -> bool {
        self.timer.is_some()
    }

    pub fn turn_time_seconds(&self) -> Option<u32> {
        self.timer.map(TurnTimer::seconds)
    }
}
