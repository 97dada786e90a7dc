//! Error types for the session layer.

use spyglass_clock::ClockError;
use spyglass_protocol::SessionId;
use spyglass_roles::RoleError;

/// Errors from identity checks and offline sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential was missing, malformed, or its signature did not
    /// match.
    #[error("identity check failed: {0}")]
    IdentityFailed(String),

    /// The server cannot verify anybody (no bot token configured).
    #[error("identity check misconfigured: {0}")]
    Misconfigured(String),

    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session belongs to someone else.
    #[error("session belongs to another user")]
    Forbidden,

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Roles(#[from] RoleError),
}

impl From<ClockError> for SessionError {
    fn from(err: ClockError) -> Self {
        match err {
            ClockError::TurnTimeOutOfRange { .. } | ClockError::TimerDisabled => {
                SessionError::Validation(err.to_string())
            }
            ClockError::Paused | ClockError::InvalidState(_) => {
                SessionError::InvalidState(err.to_string())
            }
        }
    }
}
