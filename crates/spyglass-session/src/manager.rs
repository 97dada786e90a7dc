//! The offline session manager: owns every live pass-around game.
//!
//! `OfflineSessionManager` is not thread-safe by itself. The server keeps
//! one behind a `tokio::sync::Mutex`; every call is short and never
//! awaits while holding it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use spyglass_protocol::{
    OfflineCloseResponse, OfflineRevealResponse, OfflineStartResponse, OfflineTurnStatus,
    SessionId, UserId,
};
use spyglass_roles::RoleAssigner;

use crate::{OfflineConfig, OfflineSession, OfflineSettings, SessionError};

/// Registry of offline sessions, keyed by session id.
///
/// ```text
/// start() ──→ reveal()/close() × N ──→ turn_start() ──→ turn_finish()
///    │                                                        │
///    └──────────────── restart() ◀────────────────────────────┘
///
/// expire_stale() drops sessions older than the TTL (run on start()).
/// ```
pub struct OfflineSessionManager {
    sessions: HashMap<SessionId, OfflineSession>,
    assigner: RoleAssigner,
    config: OfflineConfig,
}

impl OfflineSessionManager {
    pub fn new(assigner: RoleAssigner, config: OfflineConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            assigner,
            config,
        }
    }

    /// Creates a session for `owner` and deals its first round.
    ///
    /// Expired sessions are swept first; there is no background sweep.
    pub fn start(
        &mut self,
        owner: UserId,
        settings: OfflineSettings,
        now: DateTime<Utc>,
    ) -> Result<OfflineStartResponse, SessionError> {
        self.expire_stale(now);

        let id = generate_session_id()?;
        let session = OfflineSession::new(id.clone(), owner, settings, &self.assigner, now)?;
        let response = session.start_response();
        tracing::info!(
            session_id = %id,
            %owner,
            players = session.settings.player_count,
            mode = %session.settings.play_mode,
            "offline session created"
        );
        self.sessions.insert(id, session);
        Ok(response)
    }

    pub fn reveal(
        &self,
        id: &SessionId,
        caller: UserId,
    ) -> Result<OfflineRevealResponse, SessionError> {
        self.owned(id, caller)?.reveal()
    }

    pub fn close(
        &mut self,
        id: &SessionId,
        caller: UserId,
    ) -> Result<OfflineCloseResponse, SessionError> {
        let session = self.owned_mut(id, caller)?;
        Ok(session.close(&mut rand::rng()))
    }

    /// Fresh assignment with the same settings.
    pub fn restart(
        &mut self,
        id: &SessionId,
        caller: UserId,
    ) -> Result<OfflineStartResponse, SessionError> {
        let assigner = self.assigner.clone();
        let session = self.owned_mut(id, caller)?;
        session.deal(&assigner)?;
        tracing::info!(session_id = %id, "offline session restarted");
        Ok(session.start_response())
    }

    pub fn turn_status(
        &self,
        id: &SessionId,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> Result<OfflineTurnStatus, SessionError> {
        Ok(self.owned(id, caller)?.turn_status(now))
    }

    pub fn turn_start(
        &mut self,
        id: &SessionId,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> Result<OfflineTurnStatus, SessionError> {
        self.owned_mut(id, caller)?.turn_start(now)
    }

    pub fn turn_finish(
        &mut self,
        id: &SessionId,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> Result<OfflineTurnStatus, SessionError> {
        self.owned_mut(id, caller)?.turn_finish(now)
    }

    /// Drops sessions older than the configured TTL. Returns their ids.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<SessionId> {
        let ttl = self.config.session_ttl;
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_expired(ttl, now))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
            tracing::info!(session_id = %id, "offline session expired");
        }
        expired
    }

    pub fn get(&self, id: &SessionId) -> Option<&OfflineSession> {
        self.sessions.get(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn owned(&self, id: &SessionId, caller: UserId) -> Result<&OfflineSession, SessionError> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        if session.owner != caller {
            tracing::debug!(session_id = %id, %caller, "offline session access denied");
            return Err(SessionError::Forbidden);
        }
        Ok(session)
    }

    fn owned_mut(
        &mut self,
        id: &SessionId,
        caller: UserId,
    ) -> Result<&mut OfflineSession, SessionError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        if session.owner != caller {
            tracing::debug!(session_id = %id, %caller, "offline session access denied");
            return Err(SessionError::Forbidden);
        }
        Ok(session)
    }
}

/// Simple (hyphen-less) hex form of a random UUID.
fn generate_session_id() -> Result<SessionId, SessionError> {
    SessionId::new(uuid::Uuid::new_v4().simple().to_string())
        .map_err(|e| SessionError::InvalidState(e.to_string()))
}

// =========================================================================
// Tests
// =========================================================================
