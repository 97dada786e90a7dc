use spyglass_protocol::TurnState;

/// Errors from turn-loop operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("turn time must be between {min} and {max} seconds, got {value}")]
    TurnTimeOutOfRange { value: u32, min: u32, max: u32 },

    #[error("turn timer is disabled")]
    TimerDisabled,

    #[error("turn loop is paused")]
    Paused,

    /// The loop is not in a state that allows the requested move.
    #[error("turn loop is {0}")]
    InvalidState(TurnState),
}
