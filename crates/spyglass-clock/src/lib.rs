//! Wall-clock turn rotation for Spyglass.
//!
//! Rounds with a timer rotate "whose turn it is to speak" every
//! `turn_time_seconds`. There is no scheduler thread: the speaker is
//! derived from stored timestamps on every read, so a status poll at any
//! moment sees the right answer even if no request arrived for minutes.
//!
//! - [`TurnClock`]: the pure function from `(started_at, turn length,
//!   player count, start index, now)` to a [`TurnPosition`].
//! - [`TurnLoop`]: the per-round state machine (`waiting → ready_to_start →
//!   turn_loop_active → finished`) with pause/resume, shared by online
//!   rooms and offline sessions.
//!
//! # Integration
//!
//! ```ignore
//! let mut turns = TurnLoop::new(TurnTimer::from_settings(true, Some(8))?);
//! turns.deal(starter_index);
//! turns.start(Utc::now())?;
//! let speaker = turns.position(players.len(), Utc::now());
//! ```

mod clock;
mod error;
mod turn_loop;

pub use clock::{
    DEFAULT_TURN_TIME_SECONDS, MAX_TURN_TIME_SECONDS, MIN_TURN_TIME_SECONDS, TurnClock,
    TurnPosition, TurnTimer,
};
pub use error::ClockError;
pub use turn_loop::TurnLoop;
