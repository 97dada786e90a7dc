//! The room aggregate: roster, lifecycle, dealt roles and turn loop.
//!
//! `Room` is plain synchronous state. Every method takes the current time
//! explicitly, so the lifecycle can be tested with fixed instants; the
//! actor in [`crate::actor`] owns one `Room` and feeds it `Utc::now()`.
//!
//! ```text
//! Waiting ──start──▶ Started ──leave mid-loop──▶ Paused
//!    ▲                  │  ▲                       │
//!    │                  │  └────────resume─────────┘
//!    │                finish                       │
//!    │                  ▼                        finish
//!    └────lobby──── Finished ◀─────────────────────┘
//!
//! restart: any state ──▶ Started (fresh deal)
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use spyglass_clock::TurnLoop;
use spyglass_protocol::{
    FormatMode, Identity, LeaveResponse, LifecycleState, MIN_PLAYERS, RoleCard, RoomCode,
    RoomInfo, RoomPlayer, Scenario, StartResponse, TurnState, UserId,
};
use spyglass_roles::RoleAssigner;
use tracing::{debug, info, warn};

use crate::{PresenceTracker, RoomError, RoomSettings};

/// Upper bound of one `bots/add` request.
pub const MAX_BOTS_PER_REQUEST: u32 = 10;

const BOT_NAME_PREFIX: &str = "Bot ";

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub user_id: UserId,
    pub display_name: String,
    /// Synthetic filler. Bots have negative ids and never send heartbeats.
    pub is_bot: bool,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    fn bot_number(&self) -> Option<u32> {
        if !self.is_bot {
            return None;
        }
        self.display_name.strip_prefix(BOT_NAME_PREFIX)?.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One online room.
///
/// Invariants kept by every method:
/// - the roster never exceeds the player limit;
/// - the owner is a human in the roster while the room is open;
/// - dealt roles are keyed by exactly the current roster;
/// - `Paused` only happens to a timed round whose loop was running.
#[derive(Debug)]
pub struct Room {
    code: RoomCode,
    settings: RoomSettings,
    owner: UserId,
    /// Join order, which is also turn order.
    players: Vec<Player>,
    presence: PresenceTracker,
    state: LifecycleState,
    turns: TurnLoop,
    roles: HashMap<UserId, RoleCard>,
    scenario: Option<Scenario>,
    starter: Option<UserId>,
    created_at: DateTime<Utc>,
    paused_at: Option<DateTime<Utc>>,
    status_message: Option<String>,
    closed: bool,
}

impl Room {
    /// Opens a lobby with `owner` as its first player.
    pub fn new(
        code: RoomCode,
        owner: &Identity,
        settings: RoomSettings,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, RoomError> {
        let display_name = require_name(owner)?;
        let mut presence = PresenceTracker::new(stale_after);
        presence.touch(owner.user_id, now);
        Ok(Self {
            code,
            turns: TurnLoop::new(settings.timer),
            settings,
            owner: owner.user_id,
            players: vec![Player {
                user_id: owner.user_id,
                display_name,
                is_bot: false,
                joined_at: now,
            }],
            presence,
            state: LifecycleState::Waiting,
            roles: HashMap::new(),
            scenario: None,
            starter: None,
            created_at: now,
            paused_at: None,
            status_message: None,
            closed: false,
        })
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn turn_state(&self) -> TurnState {
        self.turns.state()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.players.iter().any(|p| p.user_id == user_id)
    }

    /// The scenario drawn for the current round. Server-side only.
    pub fn scenario(&self) -> Option<Scenario> {
        self.scenario
    }

    /// The full role assignment. Server-side only; clients get their own
    /// entry through [`role`](Self::role).
    pub fn assignment(&self) -> &HashMap<UserId, RoleCard> {
        &self.roles
    }

    // -- Membership -------------------------------------------------------

    /// Adds a player to the lobby.
    ///
    /// A caller who is already in the roster gets a no-op (and is restored
    /// if they had departed), whatever the state.
    pub fn join(&mut self, identity: &Identity, now: DateTime<Utc>) -> Result<(), RoomError> {
        if self.is_member(identity.user_id) {
            debug!(room_code = %self.code, user_id = %identity.user_id, "redundant join");
            return self.touch(identity.user_id, now);
        }
        let display_name = require_name(identity)?;
        self.evict_stale(now)?;
        if !self.state.is_joinable() {
            return Err(RoomError::InvalidState("game already started".into()));
        }
        if self.players.len() >= self.settings.player_limit {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        self.players.push(Player {
            user_id: identity.user_id,
            display_name,
            is_bot: false,
            joined_at: now,
        });
        self.presence.touch(identity.user_id, now);
        info!(
            room_code = %self.code,
            user_id = %identity.user_id,
            players = self.players.len(),
            "player joined"
        );
        Ok(())
    }

    /// Records a sign of life from a member, then evicts anyone who went
    /// silent. Fails with `NotFound` if the eviction closed the room.
    pub fn touch(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        if !self.is_member(user_id) {
            debug!(room_code = %self.code, %user_id, "request from non-member");
            return Err(RoomError::NotInRoom(user_id, self.code.clone()));
        }
        if self.presence.touch(user_id, now) {
            let name = self.name_of(user_id).unwrap_or_default();
            self.status_message = Some(format!("{name} is back"));
            info!(room_code = %self.code, %user_id, "departed player restored");
        }
        self.evict_stale(now)
    }

    /// Explicit leave. Never fails: leaving a room you are not in is just
    /// `left: false`.
    pub fn leave(&mut self, user_id: UserId, now: DateTime<Utc>) -> LeaveResponse {
        if !self.is_member(user_id) {
            debug!(room_code = %self.code, %user_id, "leave from non-member");
            return LeaveResponse {
                left: false,
                room_closed: self.closed,
            };
        }
        self.depart(user_id, now, "left the room");
        LeaveResponse {
            left: true,
            room_closed: self.closed,
        }
    }

    /// Treats players silent for longer than the stale threshold as having
    /// left. Lobbies are exempt.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> Result<(), RoomError> {
        if self.state != LifecycleState::Waiting && !self.closed {
            let stale = self.presence.stale(now);
            let in_order: Vec<UserId> = self
                .players
                .iter()
                .map(|p| p.user_id)
                .filter(|id| stale.contains(id))
                .collect();
            for user_id in in_order {
                warn!(room_code = %self.code, %user_id, "player went silent, evicting");
                self.depart(user_id, now, "lost connection");
                if self.closed {
                    break;
                }
            }
        }
        if self.closed {
            return Err(RoomError::NotFound(self.code.clone()));
        }
        Ok(())
    }

    // -- Rounds -----------------------------------------------------------

    /// Deals the first round from the lobby.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        caller: UserId,
        assigner: &RoleAssigner,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<StartResponse, RoomError> {
        self.enter_as_owner(caller, now)?;
        if self.state != LifecycleState::Waiting {
            return Err(RoomError::InvalidState("game already started".into()));
        }
        self.deal(assigner, rng)
    }

    /// Deals a fresh round from any state. Departed players are dropped
    /// first.
    pub fn restart<R: Rng + ?Sized>(
        &mut self,
        caller: UserId,
        assigner: &RoleAssigner,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<StartResponse, RoomError> {
        self.enter_as_owner(caller, now)?;
        self.drop_departed(now);
        self.deal(assigner, rng)
    }

    /// Back to the lobby, forgetting the round.
    pub fn lobby(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        self.drop_departed(now);
        self.state = LifecycleState::Waiting;
        self.roles.clear();
        self.scenario = None;
        self.starter = None;
        self.turns.reset();
        self.paused_at = None;
        self.status_message = None;
        info!(room_code = %self.code, "room back to lobby");
        Ok(())
    }

    /// Ends the round. Roles stay readable.
    pub fn finish(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        if !self.state.can_transition_to(LifecycleState::Finished) {
            return Err(RoomError::InvalidState("game not started".into()));
        }
        self.drop_departed(now);
        if self.turns.timer().is_some() && !self.turns.is_finished() {
            self.turns.finish()?;
        }
        self.state = LifecycleState::Finished;
        self.paused_at = None;
        info!(room_code = %self.code, "round finished");
        Ok(())
    }

    pub fn turn_start(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        match self.state {
            LifecycleState::Started => {}
            LifecycleState::Paused => {
                return Err(RoomError::InvalidState("game is paused".into()));
            }
            _ => return Err(RoomError::InvalidState("game not started".into())),
        }
        if self.turns.start(now)? {
            info!(room_code = %self.code, "turn loop started");
        } else {
            debug!(room_code = %self.code, "turn loop already running");
        }
        Ok(())
    }

    /// Stops the loop. A paused room goes back to `Started`.
    pub fn turn_finish(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        if !matches!(
            self.state,
            LifecycleState::Started | LifecycleState::Paused
        ) {
            return Err(RoomError::InvalidState("game not started".into()));
        }
        self.turns.finish()?;
        if self.state == LifecycleState::Paused {
            self.drop_departed(now);
            self.state = LifecycleState::Started;
            self.paused_at = None;
        }
        info!(room_code = %self.code, "turn loop finished");
        Ok(())
    }

    /// Unpauses after a mid-loop departure.
    ///
    /// The caller's request already evicted anyone stale, so every human
    /// still in the roster is present or departed; departed players are
    /// dropped and the interrupted turn keeps its remaining time.
    pub fn resume(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        if self.state != LifecycleState::Paused {
            return Err(RoomError::InvalidState("game is not paused".into()));
        }
        self.drop_departed(now);
        self.turns.resume(now);
        self.state = LifecycleState::Started;
        self.paused_at = None;
        self.status_message = Some("Game resumed".into());
        info!(room_code = %self.code, players = self.players.len(), "room resumed");
        Ok(())
    }

    /// The caller's own role.
    pub fn role(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<RoleCard, RoomError> {
        self.touch(caller, now)?;
        if !self.state.has_roles() {
            return Err(RoomError::InvalidState("game not started".into()));
        }
        self.roles
            .get(&caller)
            .cloned()
            .ok_or_else(|| RoomError::InvalidState("no role dealt to this player".into()))
    }

    // -- Bots -------------------------------------------------------------

    /// Appends up to `count` bots. Returns how many were added.
    pub fn add_bots(
        &mut self,
        caller: UserId,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, RoomError> {
        self.enter_bot_manager(caller, now)?;
        if !(1..=MAX_BOTS_PER_REQUEST).contains(&count) {
            return Err(RoomError::Validation(format!(
                "bot count must be between 1 and {MAX_BOTS_PER_REQUEST}"
            )));
        }
        let added = self.push_bots(count as usize, now);
        if added == 0 {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        self.status_message = Some(format!("Added {added} bots"));
        Ok(added)
    }

    /// Tops the roster up to the player limit with bots.
    pub fn fill_bots(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<usize, RoomError> {
        self.enter_bot_manager(caller, now)?;
        let free = self.settings.player_limit.saturating_sub(self.players.len());
        if free == 0 {
            return Err(RoomError::RoomFull(self.code.clone()));
        }
        let added = self.push_bots(free, now);
        self.status_message = Some(format!("Added {added} bots"));
        Ok(added)
    }

    pub fn clear_bots(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<usize, RoomError> {
        self.enter_bot_manager(caller, now)?;
        let before = self.players.len();
        self.players.retain(|p| !p.is_bot);
        let removed = before - self.players.len();
        self.status_message = Some(if removed > 0 {
            format!("Removed {removed} bots")
        } else {
            "No bots in the room".into()
        });
        debug!(room_code = %self.code, removed, "bots cleared");
        Ok(removed)
    }

    // -- Snapshot ---------------------------------------------------------

    /// The room as `caller` may see it. Never includes the role
    /// assignment or the drawn scenario. `can_manage_bots` is left false
    /// for the server to decide.
    pub fn snapshot(&self, caller: UserId, now: DateTime<Utc>) -> RoomInfo {
        let owner_name = self.name_of(self.owner).unwrap_or_default().to_string();
        let in_round = matches!(
            self.state,
            LifecycleState::Started | LifecycleState::Paused
        );
        let position = if in_round {
            self.turns.position(self.players.len(), now)
        } else {
            None
        };
        let speaker = position.and_then(|p| self.players.get(p.index));
        let starter = self.starter.filter(|_| self.state.has_roles());

        RoomInfo {
            room_code: self.code.clone(),
            owner_user_id: self.owner,
            host_name: owner_name.clone(),
            owner_name,
            format_mode: FormatMode::Online,
            play_mode: self.settings.play_mode,
            players: self
                .players
                .iter()
                .map(|p| RoomPlayer {
                    user_id: p.user_id,
                    display_name: p.display_name.clone(),
                    is_bot: p.is_bot,
                    is_present: self.presence.is_present(p.user_id),
                })
                .collect(),
            player_count: self.players.len(),
            player_limit: self.settings.player_limit,
            state: self.state,
            can_start: caller == self.owner
                && self.state == LifecycleState::Waiting
                && self.players.len() >= MIN_PLAYERS,
            you_are_owner: caller == self.owner,
            starter_user_id: starter,
            starter_name: starter.and_then(|id| self.name_of(id)).map(str::to_string),
            timer_enabled: self.settings.timer_enabled(),
            turn_time_seconds: self.settings.turn_time_seconds(),
            turn_active: self.state == LifecycleState::Started && self.turns.is_running(),
            turn_state: self.turns.state(),
            current_turn_index: position.map(|p| p.index),
            current_turn_user_id: speaker.map(|p| p.user_id),
            current_turn_name: speaker.map(|p| p.display_name.clone()),
            turn_started_at: self.turns.started_at(),
            turn_remaining_ms: position
                .and_then(|p| p.remaining)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            turns_completed: self.turns.is_finished(),
            paused_at: self.paused_at,
            status_message: self.status_message.clone(),
            can_manage_bots: false,
        }
    }

    // -- Internals --------------------------------------------------------

    fn enter_as_owner(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.touch(caller, now)?;
        if caller != self.owner {
            debug!(room_code = %self.code, %caller, "owner action from non-owner");
            return Err(RoomError::NotOwner);
        }
        Ok(())
    }

    fn enter_bot_manager(&mut self, caller: UserId, now: DateTime<Utc>) -> Result<(), RoomError> {
        self.enter_as_owner(caller, now)?;
        if self.state != LifecycleState::Waiting {
            return Err(RoomError::InvalidState(
                "bots can only be managed in the lobby".into(),
            ));
        }
        Ok(())
    }

    fn deal<R: Rng + ?Sized>(
        &mut self,
        assigner: &RoleAssigner,
        rng: &mut R,
    ) -> Result<StartResponse, RoomError> {
        let count = self.players.len();
        if count < MIN_PLAYERS {
            return Err(RoomError::NotEnoughPlayers {
                count,
                min: MIN_PLAYERS,
            });
        }
        let ids: Vec<UserId> = self.players.iter().map(|p| p.user_id).collect();
        let deal = assigner.deal_with(
            rng,
            &ids,
            self.settings.play_mode,
            &self.settings.allowed_scenarios,
        )?;
        let starter_index = rng.random_range(0..count);
        let starter_user_id = self.players[starter_index].user_id;
        let starter_name = self.players[starter_index].display_name.clone();

        self.roles = deal.roles;
        self.scenario = deal.scenario;
        self.starter = Some(starter_user_id);
        let turn_state = self.turns.deal(starter_index);
        self.state = LifecycleState::Started;
        self.paused_at = None;
        self.status_message = None;

        info!(
            room_code = %self.code,
            players = count,
            starter = %starter_user_id,
            %turn_state,
            "round dealt"
        );
        Ok(StartResponse {
            started: true,
            starter_user_id,
            starter_name,
        })
    }

    /// Shared by explicit leave and stale eviction.
    fn depart(&mut self, user_id: UserId, now: DateTime<Utc>, reason: &str) {
        let name = self.name_of(user_id).unwrap_or_default().to_string();
        let mid_loop = (self.state == LifecycleState::Started && self.turns.is_running())
            || self.state == LifecycleState::Paused;

        if mid_loop {
            self.presence.mark_departed(user_id);
            if self.state == LifecycleState::Started {
                self.pause(now);
            }
        } else {
            self.remove_player(user_id, now);
        }
        self.status_message = Some(format!("{name} {reason}"));

        if user_id == self.owner {
            self.transfer_ownership();
        }
        if !self.has_present_human() {
            self.closed = true;
            info!(room_code = %self.code, "room closed");
        }
    }

    fn pause(&mut self, now: DateTime<Utc>) {
        if !self.state.can_transition_to(LifecycleState::Paused) {
            return;
        }
        self.turns.pause(now);
        self.state = LifecycleState::Paused;
        self.paused_at = Some(now);
        info!(room_code = %self.code, "room paused");
    }

    fn remove_player(&mut self, user_id: UserId, now: DateTime<Utc>) {
        let Some(index) = self.players.iter().position(|p| p.user_id == user_id) else {
            return;
        };
        self.players.remove(index);
        self.presence.forget(user_id);
        self.roles.remove(&user_id);
        self.turns.seat_removed(index, self.players.len(), now);
        if self.starter == Some(user_id) {
            self.starter = self.next_starter(now);
        }
        debug!(room_code = %self.code, %user_id, players = self.players.len(), "player removed");
    }

    /// Whoever the loop now points at, or the first seat.
    fn next_starter(&self, now: DateTime<Utc>) -> Option<UserId> {
        let index = match self.turns.state() {
            TurnState::ReadyToStart => self
                .turns
                .position(self.players.len(), now)
                .map(|p| p.index)
                .unwrap_or(0),
            _ => 0,
        };
        self.players.get(index).map(|p| p.user_id)
    }

    fn drop_departed(&mut self, now: DateTime<Utc>) {
        let departed: Vec<UserId> = self
            .players
            .iter()
            .map(|p| p.user_id)
            .filter(|id| self.presence.is_departed(*id))
            .collect();
        for user_id in departed {
            info!(room_code = %self.code, %user_id, "dropping departed player");
            self.remove_player(user_id, now);
        }
    }

    /// Hands the room to the earliest-joined present human, if any.
    fn transfer_ownership(&mut self) {
        let previous = self.owner;
        let next = self
            .players
            .iter()
            .find(|p| !p.is_bot && p.user_id != previous && self.presence.is_present(p.user_id))
            .map(|p| (p.user_id, p.display_name.clone()));
        if let Some((user_id, name)) = next {
            self.owner = user_id;
            info!(room_code = %self.code, from = %previous, to = %user_id, "ownership transferred");
            if let Some(message) = self.status_message.as_mut() {
                message.push_str(&format!(". {name} is now the host"));
            }
        }
    }

    fn has_present_human(&self) -> bool {
        self.players
            .iter()
            .any(|p| !p.is_bot && self.presence.is_present(p.user_id))
    }

    fn push_bots(&mut self, wanted: usize, now: DateTime<Utc>) -> usize {
        let free = self.settings.player_limit.saturating_sub(self.players.len());
        let to_add = wanted.min(free);
        let mut number = self
            .players
            .iter()
            .filter_map(Player::bot_number)
            .max()
            .unwrap_or(0);
        let mut id = self
            .players
            .iter()
            .map(|p| p.user_id.0)
            .filter(|id| *id < 0)
            .min()
            .unwrap_or(0);
        for _ in 0..to_add {
            number += 1;
            id -= 1;
            self.players.push(Player {
                user_id: UserId(id),
                display_name: format!("{BOT_NAME_PREFIX}{number}"),
                is_bot: true,
                joined_at: now,
            });
        }
        if to_add > 0 {
            debug!(room_code = %self.code, added = to_add, players = self.players.len(), "bots added");
        }
        to_add
    }

    fn name_of(&self, user_id: UserId) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.display_name.as_str())
    }
}

fn require_name(identity: &Identity) -> Result<String, RoomError> {
    let name = identity.display_name.trim();
    if name.is_empty() {
        return Err(RoomError::Validation("display name is required".into()));
    }
    Ok(name.to_string())
}

// =========================================================================
// Tests
// =========================================================================
