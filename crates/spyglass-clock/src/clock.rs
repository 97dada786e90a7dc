use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ClockError;

// ---------------------------------------------------------------------------
// Turn timer
// ---------------------------------------------------------------------------

pub const MIN_TURN_TIME_SECONDS: u32 = 5;
pub const MAX_TURN_TIME_SECONDS: u32 = 30;
pub const DEFAULT_TURN_TIME_SECONDS: u32 = 8;

/// A validated per-turn time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimer {
    seconds: u32,
}

impl Default for TurnTimer {
    fn default() -> Self {
        Self {
            seconds: DEFAULT_TURN_TIME_SECONDS,
        }
    }
}

impl TurnTimer {
    pub fn new(seconds: u32) -> Result<Self, ClockError> {
        if !(MIN_TURN_TIME_SECONDS..=MAX_TURN_TIME_SECONDS).contains(&seconds) {
            return Err(ClockError::TurnTimeOutOfRange {
                value: seconds,
                min: MIN_TURN_TIME_SECONDS,
                max: MAX_TURN_TIME_SECONDS,
            });
        }
        Ok(Self { seconds })
    }

    /// Resolves the `(timer_enabled, turn_time_seconds)` pair clients send.
    ///
    /// A disabled timer ignores any seconds value. An enabled timer without
    /// a value gets the default.
    pub fn from_settings(enabled: bool, seconds: Option<u32>) -> Result<Option<Self>, ClockError> {
        if !enabled {
            return Ok(None);
        }
        match seconds {
            Some(s) => Self::new(s).map(Some),
            None => Ok(Some(Self::default())),
        }
    }

    pub fn seconds(self) -> u32 {
        self.seconds
    }

    pub fn turn_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.seconds))
    }

    fn turn_millis(self) -> u128 {
        u128::from(self.seconds) * 1000
    }
}

// ---------------------------------------------------------------------------
// Turn clock
// ---------------------------------------------------------------------------

/// Where the rotation stands at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnPosition {
    /// Index into the ordered player list of whoever is speaking.
    pub index: usize,
    /// Whole turns completed since the loop started.
    pub turns_elapsed: u64,
    /// Time left in the current turn. `None` when the clock is not running.
    pub remaining: Option<Duration>,
}

/// Pure turn rotation over wall-clock time.
///
/// Nothing here mutates: the speaker at any instant is a function of when
/// the loop started, the turn length, the player count and the index the
/// loop started at. Calling [`position`](Self::position) twice with the
/// same `now` gives the same answer, and moving `now` forward by `k` turn
/// lengths moves the index forward by exactly `k` (mod player count).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnClock {
    pub started_at: DateTime<Utc>,
    pub timer: TurnTimer,
    pub start_index: usize,
}

impl TurnClock {
    pub fn new(started_at: DateTime<Utc>, timer: TurnTimer, start_index: usize) -> Self {
        Self {
            started_at,
            timer,
            start_index,
        }
    }

    /// Time since the loop started, clamped at zero for clocks that moved
    /// backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Speaker at `now`. `None` when there is nobody to rotate over.
    pub fn position(&self, player_count: usize, now: DateTime<Utc>) -> Option<TurnPosition> {
        self.position_after(player_count, self.elapsed(now))
    }

    /// Speaker after `elapsed` time on the clock.
    pub fn position_after(&self, player_count: usize, elapsed: Duration) -> Option<TurnPosition> {
        if player_count == 0 {
            return None;
        }
        let turn_ms = self.timer.turn_millis();
        let elapsed_ms = elapsed.as_millis();
        let turns = elapsed_ms / turn_ms;
        let count = player_count as u128;
        let index = ((self.start_index as u128 % count + turns % count) % count) as usize;
        let remaining_ms = turn_ms - elapsed_ms % turn_ms;
        Some(TurnPosition {
            index,
            turns_elapsed: u64::try_from(turns).unwrap_or(u64::MAX),
            remaining: Some(Duration::from_millis(remaining_ms as u64)),
        })
    }

    /// Portion of `elapsed` spent inside the current turn.
    pub fn offset_in_turn(&self, elapsed: Duration) -> Duration {
        let offset = elapsed.as_millis() % self.timer.turn_millis();
        Duration::from_millis(offset as u64)
    }
}

/// Converts a non-negative std duration into a chrono delta.
pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_timer_defaults_when_enabled_without_value() {
        let timer = TurnTimer::from_settings(true, None).unwrap().unwrap();
        assert_eq!(timer.seconds(), DEFAULT_TURN_TIME_SECONDS);
    }

    #[test]
    fn test_timer_disabled_ignores_seconds() {
        assert_eq!(TurnTimer::from_settings(false, Some(99)).unwrap(), None);
    }

    #[test]
    fn test_timer_bounds() {
        assert!(TurnTimer::new(4).is_err());
        assert!(TurnTimer::new(5).is_ok());
        assert!(TurnTimer::new(30).is_ok());
        assert!(matches!(
            TurnTimer::new(31),
            Err(ClockError::TurnTimeOutOfRange { value: 31, .. })
        ));
    }

    #[test]
    fn test_position_before_start_is_clamped() {
        let clock = TurnClock::new(at(10), TurnTimer::new(5).unwrap(), 2);
        let pos = clock.position(4, at(0)).unwrap();
        assert_eq!(pos.index, 2);
        assert_eq!(pos.turns_elapsed, 0);
        assert_eq!(pos.remaining, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_position_with_no_players() {
        let clock = TurnClock::new(at(0), TurnTimer::default(), 0);
        assert_eq!(clock.position(0, at(100)), None);
    }

    #[test]
    fn test_offset_in_turn() {
        let clock = TurnClock::new(at(0), TurnTimer::new(8).unwrap(), 0);
        assert_eq!(
            clock.offset_in_turn(Duration::from_millis(17_500)),
            Duration::from_millis(1_500)
        );
    }
}
