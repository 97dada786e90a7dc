//! Offline sessions: one device passed around the table.
//!
//! An offline session deals roles over seat numbers `1..=N`. The phone is
//! handed to each number in turn (`reveal`, then `close`), and once every
//! seat has seen its role a random starter is drawn and the optional
//! turn loop takes over.
//!
//! ```text
//! reveal/close × N ──→ starter drawn ──→ ready_to_start ──→ turn_loop_active ──→ finished
//!        ▲                                                                          │
//!        └───────────────────────────── restart ───────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use spyglass_clock::{TurnLoop, TurnTimer};
use spyglass_protocol::{
    MAX_PLAYERS, MIN_PLAYERS, OfflineCloseResponse, OfflineRevealResponse,
    OfflineStartResponse, OfflineTurnStatus, PlayMode, RoleCard, Scenario, SessionId,
    TurnState, UserId,
};
use spyglass_roles::{RoleAssigner, allowed_scenarios};

use crate::SessionError;

// ---------------------------------------------------------------------------
// OfflineConfig
// ---------------------------------------------------------------------------

/// Manager-wide settings for offline sessions.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// How long a session lives after creation before it is swept.
    /// Default: 60 minutes.
    pub session_ttl: Duration,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// OfflineSettings
// ---------------------------------------------------------------------------

/// Validated settings of one offline game. Kept across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineSettings {
    pub play_mode: PlayMode,
    pub allowed_scenarios: Vec<Scenario>,
    pub player_count: usize,
    pub timer: Option<TurnTimer>,
}

impl OfflineSettings {
    pub fn new(
        play_mode: PlayMode,
        player_count: usize,
        random_allowed_modes: Option<&[Scenario]>,
        timer_enabled: bool,
        turn_time_seconds: Option<u32>,
    ) -> Result<Self, SessionError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&player_count) {
            return Err(SessionError::Validation(format!(
                "player count must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            )));
        }
        let allowed_scenarios = allowed_scenarios(play_mode, random_allowed_modes)
            .map_err(|e| SessionError::Validation(e.to_string()))?;
        let timer = TurnTimer::from_settings(timer_enabled, turn_time_seconds)?;
        Ok(Self {
            play_mode,
            allowed_scenarios,
            player_count,
            timer,
        })
    }
}

// ---------------------------------------------------------------------------
// OfflineSession
// ---------------------------------------------------------------------------

/// One pass-around game.
#[derive(Debug, Clone)]
pub struct OfflineSession {
    pub id: SessionId,
    pub owner: UserId,
    pub settings: OfflineSettings,
    pub created_at: DateTime<Utc>,
    roles: HashMap<usize, RoleCard>,
    scenario: Option<Scenario>,
    current_player_number: usize,
    starter_player_number: Option<usize>,
    turns: TurnLoop,
}

impl OfflineSession {
    /// Creates a session and deals its first round.
    pub fn new(
        id: SessionId,
        owner: UserId,
        settings: OfflineSettings,
        assigner: &RoleAssigner,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            id,
            owner,
            turns: TurnLoop::new(settings.timer),
            settings,
            created_at: now,
            roles: HashMap::new(),
            scenario: None,
            current_player_number: 1,
            starter_player_number: None,
        };
        session.deal(assigner)?;
        Ok(session)
    }

    /// Fresh assignment with the same settings, back to seat 1.
    pub fn deal(&mut self, assigner: &RoleAssigner) -> Result<(), SessionError> {
        let seats: Vec<usize> = (1..=self.settings.player_count).collect();
        let deal = assigner.deal(
            &seats,
            self.settings.play_mode,
            &self.settings.allowed_scenarios,
        )?;
        self.roles = deal.roles;
        self.scenario = deal.scenario;
        self.current_player_number = 1;
        self.starter_player_number = None;
        self.turns.reset();
        Ok(())
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }

    /// Whether seats are still being handed their roles.
    pub fn is_revealing(&self) -> bool {
        self.starter_player_number.is_none()
    }

    pub fn current_player_number(&self) -> usize {
        self.current_player_number
    }

    pub fn scenario(&self) -> Option<Scenario> {
        self.scenario
    }

    pub fn start_response(&self) -> OfflineStartResponse {
        OfflineStartResponse {
            session_id: self.id.clone(),
            current_player_number: self.current_player_number,
            player_count: self.settings.player_count,
            timer_enabled: self.settings.timer.is_some(),
            turn_time_seconds: self.settings.timer.map(TurnTimer::seconds),
        }
    }

    /// Role of whoever holds the device.
    pub fn reveal(&self) -> Result<OfflineRevealResponse, SessionError> {
        let role = self
            .roles
            .get(&self.current_player_number)
            .cloned()
            .ok_or_else(|| SessionError::InvalidState("no role for current seat".into()))?;
        Ok(OfflineRevealResponse {
            player_number: self.current_player_number,
            role,
        })
    }

    /// Hands the device on, or draws the starter after the last seat.
    ///
    /// Once the starter is drawn further calls return the same finished
    /// payload.
    pub fn close<R: Rng + ?Sized>(&mut self, rng: &mut R) -> OfflineCloseResponse {
        if let Some(starter) = self.starter_player_number {
            return OfflineCloseResponse {
                finished: true,
                current_player_number: None,
                starter_player_number: Some(starter),
            };
        }
        if self.current_player_number < self.settings.player_count {
            self.current_player_number += 1;
            return OfflineCloseResponse {
                finished: false,
                current_player_number: Some(self.current_player_number),
                starter_player_number: None,
            };
        }
        let starter = rng.random_range(1..=self.settings.player_count);
        self.starter_player_number = Some(starter);
        let state = self.turns.deal(starter - 1);
        tracing::info!(session_id = %self.id, starter, turn_state = %state, "offline roles revealed");
        OfflineCloseResponse {
            finished: true,
            current_player_number: None,
            starter_player_number: Some(starter),
        }
    }

    pub fn turn_start(&mut self, now: DateTime<Utc>) -> Result<OfflineTurnStatus, SessionError> {
        if self.settings.timer.is_none() {
            return Err(SessionError::Validation("turn timer is disabled".into()));
        }
        if self.is_revealing() {
            return Err(SessionError::InvalidState("roles are still being revealed".into()));
        }
        self.turns.start(now)?;
        Ok(self.turn_status(now))
    }

    pub fn turn_finish(&mut self, now: DateTime<Utc>) -> Result<OfflineTurnStatus, SessionError> {
        if self.settings.timer.is_none() {
            return Err(SessionError::Validation("turn timer is disabled".into()));
        }
        if self.is_revealing() {
            return Err(SessionError::InvalidState("roles are still being revealed".into()));
        }
        self.turns.finish()?;
        Ok(self.turn_status(now))
    }

    pub fn turn_status(&self, now: DateTime<Utc>) -> OfflineTurnStatus {
        let position = self.turns.position(self.settings.player_count, now);
        OfflineTurnStatus {
            timer_enabled: self.settings.timer.is_some(),
            turn_time_seconds: self.settings.timer.map(TurnTimer::seconds),
            turn_active: self.turns.is_running(),
            turn_state: self.turns.state(),
            current_turn_index: position.map(|p| p.index),
            current_player_number: position.map(|p| p.index + 1),
            turn_started_at: self.turns.started_at(),
            turn_remaining_ms: position
                .and_then(|p| p.remaining)
                .map(|d| d.as_millis() as u64),
            turns_completed: self.turns.state() == TurnState::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use spyglass_roles::CardCatalog;

    use super::*;

    fn assigner() -> RoleAssigner {
        RoleAssigner::new(Arc::new(CardCatalog::builtin().unwrap()))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(count: usize, timer: bool) -> OfflineSession {
        let settings =
            OfflineSettings::new(PlayMode::Standard, count, None, timer, Some(10)).unwrap();
        OfflineSession::new(
            SessionId::new("s1").unwrap(),
            UserId(1),
            settings,
            &assigner(),
            at(0),
        )
        .unwrap()
    }

    #[test]
    fn test_settings_reject_bad_player_count() {
        assert!(OfflineSettings::new(PlayMode::Standard, 2, None, false, None).is_err());
        assert!(OfflineSettings::new(PlayMode::Standard, 13, None, false, None).is_err());
    }

    #[test]
    fn test_settings_reject_single_scenario() {
        let err = OfflineSettings::new(
            PlayMode::Random,
            5,
            Some(&[Scenario::SameCard, Scenario::SameCard]),
            false,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[test]
    fn test_settings_reject_turn_time_out_of_range() {
        let err = OfflineSettings::new(PlayMode::Standard, 5, None, true, Some(3)).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[test]
    fn test_close_walks_every_seat_then_draws_starter() {
        let mut s = session(3, true);
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(s.reveal().unwrap().player_number, 1);

        let first = s.close(&mut rng);
        assert_eq!(first.current_player_number, Some(2));
        assert!(!first.finished);
        s.close(&mut rng);
        assert_eq!(s.reveal().unwrap().player_number, 3);

        let done = s.close(&mut rng);
        assert!(done.finished);
        let starter = done.starter_player_number.unwrap();
        assert!((1..=3).contains(&starter));

        let again = s.close(&mut rng);
        assert_eq!(again, done, "redundant close repeats the finished payload");

        let status = s.turn_status(at(1));
        assert_eq!(status.turn_state, TurnState::ReadyToStart);
        assert_eq!(status.current_player_number, Some(starter));
    }

    #[test]
    fn test_turn_start_during_reveal_is_invalid() {
        let mut s = session(4, true);
        assert!(matches!(s.turn_start(at(0)), Err(SessionError::InvalidState(_))));
        assert!(matches!(s.turn_finish(at(0)), Err(SessionError::InvalidState(_))));
    }

    #[test]
    fn test_timerless_session_rejects_turn_calls() {
        let mut s = session(5, false);
        let mut rng = StdRng::seed_from_u64(1);
        let mut last = None;
        for _ in 0..5 {
            last = Some(s.close(&mut rng));
        }
        let done = last.unwrap();
        assert!(done.finished);
        assert!((1..=5).contains(&done.starter_player_number.unwrap()));
        assert_eq!(s.turn_status(at(0)).turn_state, TurnState::Finished);
        assert!(matches!(s.turn_start(at(0)), Err(SessionError::Validation(_))));
    }

    #[test]
    fn test_turn_loop_rotates_over_seats() {
        let mut s = session(3, true);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..3 {
            s.close(&mut rng);
        }
        let starter = s.close(&mut rng).starter_player_number.unwrap();

        let status = s.turn_start(at(100)).unwrap();
        assert!(status.turn_active);
        assert_eq!(status.current_player_number, Some(starter));
        assert_eq!(status.turn_remaining_ms, Some(10_000));

        let later = s.turn_status(at(110));
        assert_eq!(later.current_player_number, Some(starter % 3 + 1));

        let finished = s.turn_finish(at(111)).unwrap();
        assert!(finished.turns_completed);
        assert!(!finished.turn_active);
        assert!(matches!(s.turn_start(at(112)), Err(SessionError::InvalidState(_))));
    }

    #[test]
    fn test_restart_resets_to_first_seat() {
        let mut s = session(4, true);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..4 {
            s.close(&mut rng);
        }
        assert!(!s.is_revealing());
        s.deal(&assigner()).unwrap();
        assert!(s.is_revealing());
        assert_eq!(s.current_player_number(), 1);
        assert_eq!(s.turn_status(at(0)).turn_state, TurnState::Waiting);
    }

    #[test]
    fn test_expiry_uses_creation_time() {
        let s = session(3, false);
        let ttl = Duration::from_secs(60);
        assert!(!s.is_expired(ttl, at(60)));
        assert!(s.is_expired(ttl, at(61)));
    }
}
