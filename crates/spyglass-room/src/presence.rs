//! Who is still at the table.
//!
//! Clients poll `status` about once a second and send a `heartbeat` every
//! few seconds; every member request counts as a sign of life. A player
//! who explicitly leaves mid-loop is kept in the roster as *departed*
//! until the host resumes or restarts, or until their client comes back.
//!
//! Bots are never tracked and always count as present.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use spyglass_protocol::UserId;

#[derive(Debug, Clone, Copy)]
struct Presence {
    last_heartbeat_at: DateTime<Utc>,
    departed: bool,
}

/// Per-room liveness bookkeeping.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    /// `None` disables stale detection.
    stale_after: Option<Duration>,
    entries: HashMap<UserId, Presence>,
}

impl PresenceTracker {
    /// A zero `stale_after` disables stale detection.
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after: (!stale_after.is_zero()).then_some(stale_after),
            entries: HashMap::new(),
        }
    }

    /// Records a sign of life. Returns `true` if the player had departed
    /// and is now restored.
    pub fn touch(&mut self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let entry = self.entries.entry(user_id).or_insert(Presence {
            last_heartbeat_at: now,
            departed: false,
        });
        entry.last_heartbeat_at = now;
        std::mem::replace(&mut entry.departed, false)
    }

    pub fn mark_departed(&mut self, user_id: UserId) {
        if let Some(entry) = self.entries.get_mut(&user_id) {
            entry.departed = true;
        }
    }

    /// Stops tracking a player who was removed from the roster.
    pub fn forget(&mut self, user_id: UserId) {
        self.entries.remove(&user_id);
    }

    /// Untracked ids (bots) are present.
    pub fn is_present(&self, user_id: UserId) -> bool {
        !self.is_departed(user_id)
    }

    pub fn is_departed(&self, user_id: UserId) -> bool {
        self.entries.get(&user_id).is_some_and(|e| e.departed)
    }

    pub fn last_heartbeat_at(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.entries.get(&user_id).map(|e| e.last_heartbeat_at)
    }

    /// Departed players, in no particular order.
    pub fn departed(&self) -> Vec<UserId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.departed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Present players whose last sign of life is older than the
    /// threshold. Always empty when stale detection is disabled.
    pub fn stale(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let Some(limit) = self.stale_after else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|(_, e)| !e.departed)
            .filter(|(_, e)| {
                (now - e.last_heartbeat_at)
                    .to_std()
                    .is_ok_and(|silent| silent > limit)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}
