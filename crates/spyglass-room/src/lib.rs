//! Online rooms for Spyglass.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns the
//! roster, the dealt roles and the turn loop. Nothing else touches room
//! state; everything goes through a [`RoomHandle`].
//!
//! # Key types
//!
//! - [`Room`]: the synchronous aggregate (lifecycle state machine)
//! - [`PresenceTracker`]: heartbeats, departed players, stale eviction
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomRegistry`]: allocates codes, creates and finds rooms
//! - [`RoomSettings`] / [`RoomConfig`]: per-room and server-wide settings

mod actor;
mod config;
mod error;
mod manager;
mod presence;
mod room;

pub use actor::{RoomAction, RoomHandle};
pub use config::{RoomConfig, RoomSettings};
pub use error::RoomError;
pub use manager::RoomRegistry;
pub use presence::PresenceTracker;
pub use room::{MAX_BOTS_PER_REQUEST, Player, Room};
