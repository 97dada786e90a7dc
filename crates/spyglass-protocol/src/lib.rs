//! Wire vocabulary for Spyglass.
//!
//! This crate defines what clients and the server agree on:
//!
//! - **Types** ([`UserId`], [`RoomCode`], [`TurnState`], ...): identifiers
//!   and the enums that appear in every snapshot.
//! - **Messages** ([`RoomInfo`], [`RoomCreateRequest`], ...): the JSON
//!   bodies of the HTTP API.
//! - **Errors** ([`ProtocolError`]): what can go wrong turning raw wire
//!   values into those types.
//!
//! # Architecture
//!
//! The protocol layer is the leaf of the workspace. It knows nothing about
//! rooms, clocks or identity checks; the other crates build on its types.
//!
//! ```text
//! HTTP (JSON) → Protocol (typed requests) → Room / Offline session
//! ```

mod error;
mod messages;
mod types;

pub use error::ProtocolError;
pub use messages::{
    AuthRequest, AuthResponse, LeaveResponse, MAX_PLAYERS, MIN_PLAYERS,
    OfflineActionRequest, OfflineCloseResponse, OfflineRevealResponse,
    OfflineStartRequest, OfflineStartResponse, OfflineTurnStatus, RoomActionRequest,
    RoomBotsAddRequest, RoomCreateRequest, RoomInfo, RoomPlayer, StartResponse,
};
pub use types::{
    FormatMode, Identity, LifecycleState, PlayMode, ROOM_CODE_ALPHABET, ROOM_CODE_LEN,
    Role, RoleCard, RoomCode, Scenario, SessionId, TurnState, UserId,
};
