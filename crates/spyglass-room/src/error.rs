//! Error types for the room layer.

use spyglass_clock::ClockError;
use spyglass_protocol::{RoomCode, UserId};
use spyglass_roles::RoleError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (or closed while the request was in flight).
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// No more player slots are available.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    #[error("player {0} is not in room {1}")]
    NotInRoom(UserId, RoomCode),

    /// Only the owner may do this.
    #[error("only the host can do this")]
    NotOwner,

    /// The room is in a state that doesn't allow this operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("need at least {min} players, got {count}")]
    NotEnoughPlayers { count: usize, min: usize },

    /// Bad settings or arguments from the client.
    #[error("{0}")]
    Validation(String),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// Every candidate code was taken.
    #[error("no free room code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error(transparent)]
    Roles(#[from] RoleError),
}

impl From<ClockError> for RoomError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::TurnTimeOutOfRange { .. } | ClockError::TimerDisabled => {
                RoomError::Validation(err.to_string())
            }
            ClockError::Paused | ClockError::InvalidState(_) => {
                RoomError::InvalidState(err.to_string())
            }
        }
    }
}
