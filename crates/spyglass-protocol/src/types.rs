//! Core identifiers and wire enums.
//!
//! Everything here is serialised into the JSON bodies that browsers poll.
//! The enums use `snake_case` on the wire (`"turn_loop_active"`,
//! `"multi_spy"`) because that is what clients switch on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable external user identity.
///
/// Human players carry the positive id their identity provider issued.
/// Bots are synthetic players and get negative ids, unique within their
/// room, so both kinds share one key space without colliding.
///
/// `#[serde(transparent)]` keeps the JSON shape a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Characters a room code is drawn from. Visually ambiguous glyphs
/// (`0/O`, `1/I`) are left out so codes survive being read aloud.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a freshly generated room code.
pub const ROOM_CODE_LEN: usize = 6;

/// The short public identifier players type to join a room.
///
/// A `RoomCode` is always normalised: whitespace and punctuation removed,
/// letters upper-cased. Construction goes through [`RoomCode::parse`], and
/// deserialisation runs the same path (`try_from = "String"`), so
/// `" ab-c d3 "` and `"ABCD3"` name the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalises raw user input into a room code.
    ///
    /// Only the *shape* is checked here (non-empty after cleanup). Whether
    /// a room with that code exists is the registry's business.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_uppercase)
            .collect();
        if normalized.is_empty() {
            return Err(ProtocolError::EmptyRoomCode);
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an offline (single-device) session.
///
/// Issued by the server as the simple (hyphen-less) hex form of a random
/// UUID; clients echo it back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Result<Self, ProtocolError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ProtocolError::EmptySessionId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verified caller, as produced by the identity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Telegram handle without the leading `@`, lower-cased. Used only for
    /// the dev-admin allow list.
    pub username: Option<String>,
    /// First and last name joined with a space.
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Game modes
// ---------------------------------------------------------------------------

/// Whether a game is played on one device or across many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatMode {
    Offline,
    Online,
}

/// How roles are dealt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// One spy, everyone else shares a card.
    #[default]
    Standard,
    /// A scenario is drawn per round from an allowed set.
    Random,
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayMode::Standard => f.write_str("standard"),
            PlayMode::Random => f.write_str("random"),
        }
    }
}

/// One random-mode rule set.
///
/// The set is closed. The resolved scenario of a round is server-side
/// knowledge only and never appears in a room snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Every player is a spy.
    AllSpies,
    /// Nobody is a spy; everyone holds the same card.
    SameCard,
    /// Nobody is a spy; each player draws a card independently.
    DifferentCards,
    /// Between 2 and N-1 spies; the rest share a card. Needs N > 3.
    MultiSpy,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::AllSpies,
        Scenario::SameCard,
        Scenario::DifferentCards,
        Scenario::MultiSpy,
    ];

    /// Whether this scenario can be played with `players` participants.
    pub fn is_eligible(self, players: usize) -> bool {
        match self {
            Scenario::MultiSpy => players > 3,
            _ => true,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::AllSpies => "all_spies",
            Scenario::SameCard => "same_card",
            Scenario::DifferentCards => "different_cards",
            Scenario::MultiSpy => "multi_spy",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A player's hidden role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Spy,
    Card,
}

/// One entry of a role assignment: a spy, or a card holder with the card's
/// presentation data. Spies never carry card fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCard {
    pub role: Role,
    pub card: Option<String>,
    pub image_url: Option<String>,
    pub elixir_cost: Option<u32>,
}

impl RoleCard {
    pub fn spy() -> Self {
        Self {
            role: Role::Spy,
            card: None,
            image_url: None,
            elixir_cost: None,
        }
    }

    pub fn card(
        name: impl Into<String>,
        image_url: Option<String>,
        elixir_cost: Option<u32>,
    ) -> Self {
        Self {
            role: Role::Card,
            card: Some(name.into()),
            image_url,
            elixir_cost,
        }
    }

    pub fn is_spy(&self) -> bool {
        self.role == Role::Spy
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Room lifecycle: `Waiting → Started ⇄ Paused → Finished`, restartable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Lobby. Players may join; the owner may manage bots.
    #[default]
    Waiting,
    /// Roles dealt, round in progress.
    Started,
    /// A running turn loop was interrupted by a player leaving.
    Paused,
    /// Round over. Roles stay readable until the next restart or lobby.
    Finished,
}

impl LifecycleState {
    /// Whether new players may enter.
    pub fn is_joinable(&self) -> bool {
        matches!(self, LifecycleState::Waiting)
    }

    /// Whether dealt roles can be read.
    pub fn has_roles(&self) -> bool {
        matches!(
            self,
            LifecycleState::Started | LifecycleState::Paused | LifecycleState::Finished
        )
    }

    /// Whether the move `self → target` is a legal direct transition.
    ///
    /// Restart (`any → Started`) and lobby (`any → Waiting`) are owner
    /// resets and are always allowed; the interesting edges are
    /// pause/resume and finish.
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, target),
            (_, Waiting)
                | (_, Started)
                | (Started, Paused)
                | (Started, Finished)
                | (Paused, Finished)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Waiting => write!(f, "waiting"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Paused => write!(f, "paused"),
            LifecycleState::Finished => write!(f, "finished"),
        }
    }
}

/// Turn-loop state of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No round yet. Offline sessions also use this as the reveal phase.
    #[default]
    Waiting,
    /// A starter is chosen; the owner may start the loop.
    ReadyToStart,
    /// The clock is running and the speaker rotates automatically.
    TurnLoopActive,
    /// The loop was stopped, or the round has no timer at all.
    Finished,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Waiting => write!(f, "waiting"),
            TurnState::ReadyToStart => write!(f, "ready_to_start"),
            TurnState::TurnLoopActive => write!(f, "turn_loop_active"),
            TurnState::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
        let back: UserId = serde_json::from_str("-3").unwrap();
        assert_eq!(back, UserId(-3));
    }

    #[test]
    fn test_room_code_normalizes_input() {
        let code = RoomCode::parse("  ab-c d3 ").unwrap();
        assert_eq!(code.as_str(), "ABCD3");
        assert_eq!(code, RoomCode::parse("abcd3").unwrap());
    }

    #[test]
    fn test_room_code_rejects_blank() {
        assert_eq!(RoomCode::parse(" -- ").unwrap_err(), ProtocolError::EmptyRoomCode);
    }

    #[test]
    fn test_room_code_deserialize_normalizes() {
        let code: RoomCode = serde_json::from_str("\"k7m-2qx\"").unwrap();
        assert_eq!(code.to_string(), "K7M2QX");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"K7M2QX\"");

        let err = serde_json::from_str::<RoomCode>("\"  \"");
        assert!(err.is_err(), "blank code must not deserialize");
    }

    #[test]
    fn test_room_code_alphabet_has_no_ambiguous_glyphs() {
        for banned in [b'0', b'O', b'1', b'I'] {
            assert!(!ROOM_CODE_ALPHABET.contains(&banned));
        }
        assert_eq!(ROOM_CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_session_id_rejects_blank() {
        assert!(SessionId::new("  ").is_err());
        assert_eq!(SessionId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_enums_use_snake_case() {
        assert_eq!(
            serde_json::to_string(&TurnState::TurnLoopActive).unwrap(),
            "\"turn_loop_active\""
        );
        assert_eq!(
            serde_json::to_string(&Scenario::DifferentCards).unwrap(),
            "\"different_cards\""
        );
        let mode: PlayMode = serde_json::from_str("\"random\"").unwrap();
        assert_eq!(mode, PlayMode::Random);
        assert!(serde_json::from_str::<Scenario>("\"one_outlier_card\"").is_err());
    }

    #[test]
    fn test_display_matches_wire_names() {
        for state in [
            TurnState::Waiting,
            TurnState::ReadyToStart,
            TurnState::TurnLoopActive,
            TurnState::Finished,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
        for scenario in Scenario::ALL {
            let json = serde_json::to_string(&scenario).unwrap();
            assert_eq!(json, format!("\"{scenario}\""));
        }
    }

    #[test]
    fn test_multi_spy_needs_four_players() {
        assert!(!Scenario::MultiSpy.is_eligible(3));
        assert!(Scenario::MultiSpy.is_eligible(4));
        assert!(Scenario::AllSpies.is_eligible(3));
    }

    #[test]
    fn test_spy_card_has_no_card_fields() {
        let spy = RoleCard::spy();
        assert!(spy.is_spy());
        let json = serde_json::to_value(&spy).unwrap();
        assert_eq!(json["role"], "spy");
        assert!(json["card"].is_null());
        assert!(json["elixir_cost"].is_null());
    }

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Started.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Finished));
        assert!(!Waiting.can_transition_to(Paused));
        assert!(!Waiting.can_transition_to(Finished));
        assert!(!Finished.can_transition_to(Paused));
        assert!(Finished.can_transition_to(Started));
        assert!(Paused.can_transition_to(Waiting));
    }

    #[test]
    fn test_lifecycle_role_visibility() {
        assert!(!LifecycleState::Waiting.has_roles());
        assert!(LifecycleState::Paused.has_roles());
        assert!(LifecycleState::Finished.has_roles());
        assert!(LifecycleState::Waiting.is_joinable());
        assert!(!LifecycleState::Started.is_joinable());
    }
}
