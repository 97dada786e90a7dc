use std::time::Duration;

use chrono::{DateTime, Utc};
use spyglass_protocol::TurnState;
use tracing::debug;

use crate::clock::{TurnClock, TurnPosition, TurnTimer, to_delta};
use crate::error::ClockError;

/// Turn-state machine of one round.
///
/// ```text
/// Waiting ──deal──▶ ReadyToStart ──start──▶ TurnLoopActive ──finish──▶ Finished
///    │                                        │      ▲
///    └──deal (no timer)──▶ Finished          pause  resume
/// ```
///
/// While paused the loop stays `TurnLoopActive` but the clock is frozen:
/// the elapsed time at the moment of the pause is kept, and `resume`
/// rebases the start so the interrupted turn keeps its remaining time.
#[derive(Debug, Clone)]
pub struct TurnLoop {
    timer: Option<TurnTimer>,
    state: TurnState,
    start_index: usize,
    started_at: Option<DateTime<Utc>>,
    paused_elapsed: Option<Duration>,
}

impl TurnLoop {
    pub fn new(timer: Option<TurnTimer>) -> Self {
        Self {
            timer,
            state: TurnState::Waiting,
            start_index: 0,
            started_at: None,
            paused_elapsed: None,
        }
    }

    pub fn timer(&self) -> Option<TurnTimer> {
        self.timer
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether the clock is running right now.
    pub fn is_running(&self) -> bool {
        self.state == TurnState::TurnLoopActive && self.paused_elapsed.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_elapsed.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state == TurnState::Finished
    }

    /// When the running clock (re)started. `None` unless running.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        if self.is_running() { self.started_at } else { None }
    }

    /// Arms the loop after roles were dealt. `start_index` is the seat of
    /// the player who speaks first.
    ///
    /// Without a timer the turn concept is inert and the loop goes straight
    /// to `Finished`.
    pub fn deal(&mut self, start_index: usize) -> TurnState {
        self.start_index = start_index;
        self.started_at = None;
        self.paused_elapsed = None;
        self.state = if self.timer.is_some() {
            TurnState::ReadyToStart
        } else {
            TurnState::Finished
        };
        self.state
    }

    /// Back to `Waiting`, forgetting any round.
    pub fn reset(&mut self) {
        self.state = TurnState::Waiting;
        self.start_index = 0;
        self.started_at = None;
        self.paused_elapsed = None;
    }

    /// Starts the rotation. Returns `Ok(false)` if it was already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<bool, ClockError> {
        if self.timer.is_none() {
            return Err(ClockError::TimerDisabled);
        }
        if self.is_paused() {
            return Err(ClockError::Paused);
        }
        match self.state {
            TurnState::ReadyToStart => {
                self.state = TurnState::TurnLoopActive;
                self.started_at = Some(now);
                debug!(start_index = self.start_index, "turn loop started");
                Ok(true)
            }
            TurnState::TurnLoopActive => Ok(false),
            other => Err(ClockError::InvalidState(other)),
        }
    }

    /// Stops the rotation for good. Idempotent once finished.
    pub fn finish(&mut self) -> Result<(), ClockError> {
        if self.timer.is_none() {
            return Err(ClockError::TimerDisabled);
        }
        if self.state == TurnState::Waiting {
            return Err(ClockError::InvalidState(self.state));
        }
        self.state = TurnState::Finished;
        self.started_at = None;
        self.paused_elapsed = None;
        Ok(())
    }

    /// Freezes a running clock. Returns whether anything changed.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        let elapsed = self.clock().map(|c| c.elapsed(now)).unwrap_or_default();
        self.paused_elapsed = Some(elapsed);
        debug!(elapsed_ms = elapsed.as_millis() as u64, "turn loop paused");
        true
    }

    /// Unfreezes the clock so the interrupted turn keeps its remaining time.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        let Some(elapsed) = self.paused_elapsed.take() else {
            return false;
        };
        self.started_at = Some(now - to_delta(elapsed));
        debug!(elapsed_ms = elapsed.as_millis() as u64, "turn loop resumed");
        true
    }

    /// Current speaker, if the round has one.
    ///
    /// In `ReadyToStart` this is the starter with no time running. While
    /// paused it is the speaker at the moment of the pause.
    pub fn position(&self, player_count: usize, now: DateTime<Utc>) -> Option<TurnPosition> {
        if player_count == 0 {
            return None;
        }
        match self.state {
            TurnState::ReadyToStart => Some(TurnPosition {
                index: self.start_index % player_count,
                turns_elapsed: 0,
                remaining: None,
            }),
            TurnState::TurnLoopActive => {
                let clock = self.clock()?;
                let elapsed = self.paused_elapsed.unwrap_or_else(|| clock.elapsed(now));
                clock.position_after(player_count, elapsed)
            }
            TurnState::Waiting | TurnState::Finished => None,
        }
    }

    /// Keeps the current speaker consistent after the seat at `removed`
    /// left a roster that now has `remaining` players.
    ///
    /// Seats after the removed one shift down by one. If the speaker
    /// themselves left, the next seat inherits the turn (wrapping to the
    /// front), with whatever time was left on it.
    pub fn seat_removed(&mut self, removed: usize, remaining: usize, now: DateTime<Utc>) {
        if remaining == 0 {
            if self.state != TurnState::Waiting {
                self.state = TurnState::Finished;
            }
            self.started_at = None;
            self.paused_elapsed = None;
            return;
        }
        match self.state {
            TurnState::ReadyToStart => {
                self.start_index = shift_index(self.start_index, removed, remaining);
            }
            TurnState::TurnLoopActive => {
                let Some(clock) = self.clock() else {
                    return;
                };
                let elapsed = self.paused_elapsed.unwrap_or_else(|| clock.elapsed(now));
                let current = clock
                    .position_after(remaining + 1, elapsed)
                    .map(|p| p.index)
                    .unwrap_or(0);
                let offset = clock.offset_in_turn(elapsed);
                self.start_index = shift_index(current, removed, remaining);
                if self.paused_elapsed.is_some() {
                    self.paused_elapsed = Some(offset);
                } else {
                    self.started_at = Some(now - to_delta(offset));
                }
            }
            TurnState::Waiting | TurnState::Finished => {}
        }
    }

    /// The clock as last anchored. While paused its `started_at` is stale;
    /// only the frozen elapsed time is meaningful.
    fn clock(&self) -> Option<TurnClock> {
        Some(TurnClock::new(self.started_at?, self.timer?, self.start_index))
    }
}

fn shift_index(current: usize, removed: usize, remaining: usize) -> usize {
    let mut index = current;
    if removed < index {
        index -= 1;
    } else if removed == index && index >= remaining {
        index = 0;
    }
    index.min(remaining.saturating_sub(1))
}
