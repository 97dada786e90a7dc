//! Error types for the protocol layer.
//!
//! Each crate in Spyglass defines its own error enum. A `ProtocolError`
//! means a value coming off the wire could not be turned into one of the
//! strongly-typed identifiers in this crate; it never means a room or
//! session operation failed.

/// Errors raised while parsing wire values into protocol types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A room code was empty once whitespace and punctuation were removed.
    #[error("room code is empty")]
    EmptyRoomCode,

    /// A session id was blank.
    #[error("session id is empty")]
    EmptySessionId,
}
