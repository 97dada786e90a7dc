//! Room registry: allocates codes, spawns room actors, routes lookups.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use spyglass_protocol::{Identity, LifecycleState, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, RoomCode, RoomInfo};
use spyglass_roles::RoleAssigner;

use crate::actor::spawn_room;
use crate::{Room, RoomConfig, RoomError, RoomHandle, RoomSettings};

/// How many stored codes `room_debug` logging shows.
const KEY_PREVIEW_LEN: usize = 10;

/// All live rooms, keyed by code.
///
/// Not thread-safe by itself: the server keeps it behind one
/// `tokio::sync::Mutex` and only holds the lock for map operations. Room
/// commands go through cloned [`RoomHandle`]s after the lock is released.
///
/// There is no background sweep. [`create`](Self::create) first drops
/// rooms whose actor stopped and shuts down lobbies idle for longer than
/// the configured TTL.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,
    assigner: RoleAssigner,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(assigner: RoleAssigner, config: RoomConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            assigner,
            config,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Opens a room owned by `owner` and returns its handle together with
    /// the owner's first snapshot.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(
        &mut self,
        owner: &Identity,
        settings: RoomSettings,
        now: DateTime<Utc>,
    ) -> Result<(RoomHandle, RoomInfo), RoomError> {
        self.sweep(now);

        let code = self.generate_code(&mut rand::rng())?;
        let room = Room::new(code.clone(), owner, settings, self.config.stale_after, now)?;
        let info = room.snapshot(owner.user_id, now);
        let handle = spawn_room(room, self.assigner.clone(), self.config.channel_size);
        self.rooms.insert(code.clone(), handle.clone());

        tracing::info!(
            room_code = %code,
            owner = %owner.user_id,
            limit = info.player_limit,
            mode = %info.play_mode,
            rooms = self.rooms.len(),
            "room created"
        );
        Ok((handle, info))
    }

    /// Looks up a live room. Closed rooms found on the way are dropped.
    pub fn get(&mut self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        if self.config.room_debug {
            tracing::info!(room_code = %code, stored = %self.key_preview(), "room lookup");
        }
        match self.rooms.get(code) {
            Some(handle) if !handle.is_closed() => Ok(handle.clone()),
            Some(_) => {
                self.rooms.remove(code);
                tracing::debug!(room_code = %code, "dropped closed room on lookup");
                Err(RoomError::NotFound(code.clone()))
            }
            None => Err(RoomError::NotFound(code.clone())),
        }
    }

    /// Forgets `room` once it has closed, e.g. after its last player left.
    ///
    /// Does nothing if the code now belongs to a different room. Returns
    /// whether an entry was removed.
    pub fn remove_if_closed(&mut self, room: &RoomHandle) -> bool {
        let code = room.code();
        let ours = self
            .rooms
            .get(code)
            .is_some_and(|stored| stored.same_room(room) && stored.is_closed());
        if ours {
            self.rooms.remove(code);
            tracing::info!(room_code = %code, "room removed from registry");
        }
        ours
    }

    /// Drops closed rooms and shuts down lobbies that saw no command for
    /// longer than the TTL. Returns the codes that were freed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<RoomCode> {
        let ttl = self.config.waiting_ttl;
        let mut freed = Vec::new();
        self.rooms.retain(|code, handle| {
            if handle.is_closed() {
                freed.push(code.clone());
                return false;
            }
            let expired = handle.state() == LifecycleState::Waiting
                && (now - handle.last_activity())
                    .to_std()
                    .is_ok_and(|idle| idle > ttl);
            if expired {
                if !handle.try_shutdown() {
                    tracing::debug!(room_code = %code, "idle lobby busy, dropping handle only");
                }
                tracing::info!(room_code = %code, "idle lobby expired");
                freed.push(code.clone());
                return false;
            }
            true
        });
        freed
    }

    /// Whether `code` names a live room.
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.get(code).is_some_and(|h| !h.is_closed())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn codes(&self) -> Vec<RoomCode> {
        self.rooms.keys().cloned().collect()
    }

    /// Draws random codes until one is free, up to the configured number
    /// of attempts. Codes of closed rooms count as free.
    fn generate_code<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<RoomCode, RoomError> {
        let attempts = self.config.code_attempts;
        for _ in 0..attempts {
            let candidate: String = (0..ROOM_CODE_LEN)
                .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
                .collect();
            let code =
                RoomCode::parse(&candidate).map_err(|e| RoomError::Validation(e.to_string()))?;
            if !self.contains(&code) {
                return Ok(code);
            }
            tracing::debug!(room_code = %code, "room code collision");
        }
        Err(RoomError::CodeSpaceExhausted { attempts })
    }

    fn key_preview(&self) -> String {
        self.rooms
            .keys()
            .take(KEY_PREVIEW_LEN)
            .map(RoomCode::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use spyglass_protocol::{PlayMode, UserId};
    use spyglass_roles::CardCatalog;

    use super::*;
    use crate::RoomAction;

    fn registry(config: RoomConfig) -> RoomRegistry {
        RoomRegistry::new(
            RoleAssigner::new(Arc::new(CardCatalog::builtin().unwrap())),
            config,
        )
    }

    fn owner(id: i64) -> Identity {
        Identity {
            user_id: UserId(id),
            username: None,
            display_name: format!("Player {id}"),
        }
    }

    fn settings() -> RoomSettings {
        RoomSettings::new(PlayMode::Standard, 6, None, false, None).unwrap()
    }

    /// Spawns a room under a chosen code, bypassing code generation.
    fn open_with_code(reg: &mut RoomRegistry, code: &RoomCode, owner_id: i64) -> RoomHandle {
        let room = Room::new(
            code.clone(),
            &owner(owner_id),
            settings(),
            reg.config.stale_after,
            Utc::now(),
        )
        .unwrap();
        let handle = spawn_room(room, reg.assigner.clone(), reg.config.channel_size);
        reg.rooms.insert(code.clone(), handle.clone());
        handle
    }

    #[test]
    fn test_generated_codes_use_the_alphabet() {
        let reg = registry(RoomConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let code = reg.generate_code(&mut rng).unwrap();
            assert_eq!(code.as_str().len(), ROOM_CODE_LEN);
            assert!(code.as_str().bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_zero_attempts_exhausts_code_space() {
        let reg = registry(RoomConfig {
            code_attempts: 0,
            ..RoomConfig::default()
        });
        assert!(matches!(
            reg.generate_code(&mut StdRng::seed_from_u64(1)),
            Err(RoomError::CodeSpaceExhausted { attempts: 0 })
        ));
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let mut reg = registry(RoomConfig::default());
        let (handle, info) = reg.create(&owner(1), settings(), Utc::now()).unwrap();
        assert_eq!(info.player_count, 1);
        assert!(info.you_are_owner);
        assert_eq!(reg.len(), 1);
        let found = reg.get(handle.code()).unwrap();
        assert_eq!(found.code(), handle.code());
    }

    #[tokio::test]
    async fn test_get_unknown_code() {
        let mut reg = registry(RoomConfig::default());
        let code = RoomCode::parse("ZZZZZZ").unwrap();
        assert!(matches!(reg.get(&code), Err(RoomError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_owner_name() {
        let mut reg = registry(RoomConfig::default());
        let nameless = Identity {
            display_name: String::new(),
            ..owner(1)
        };
        assert!(matches!(
            reg.create(&nameless, settings(), Utc::now()),
            Err(RoomError::Validation(_))
        ));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expires_old_lobbies_only() {
        let mut reg = registry(RoomConfig::default());
        let (fresh, _) = reg.create(&owner(2), settings(), Utc::now()).unwrap();
        // Created last so `create`'s own sweep doesn't catch it.
        let old = Utc::now() - TimeDelta::minutes(61);
        let (stale, _) = reg.create(&owner(1), settings(), old).unwrap();

        let freed = reg.sweep(Utc::now());
        assert_eq!(freed, vec![stale.code().clone()]);
        assert!(!reg.contains(stale.code()));
        assert!(reg.contains(fresh.code()));
    }

    #[tokio::test]
    async fn test_closed_room_is_dropped_on_lookup() {
        let mut reg = registry(RoomConfig::default());
        let (handle, _) = reg.create(&owner(1), settings(), Utc::now()).unwrap();
        let left = handle.leave(UserId(1)).await.unwrap();
        assert!(left.room_closed);
        assert!(handle.is_closed());
        assert!(matches!(reg.get(handle.code()), Err(RoomError::NotFound(_))));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn test_old_lobby_in_use_survives_sweep() {
        let mut reg = registry(RoomConfig::default());
        let old = Utc::now() - TimeDelta::minutes(61);
        let (room, _) = reg.create(&owner(1), settings(), old).unwrap();
        room.join(owner(2)).await.unwrap();
        room.join(owner(3)).await.unwrap();
        room.start(UserId(1)).await.unwrap();
        room.act(UserId(1), RoomAction::Lobby).await.unwrap();
        room.status(UserId(1)).await.unwrap();
        assert_eq!(room.state(), LifecycleState::Waiting);

        reg.create(&owner(9), settings(), Utc::now()).unwrap();

        assert!(reg.contains(room.code()));
        let info = room.status(UserId(2)).await.unwrap();
        assert_eq!(info.player_count, 3);
    }

    #[tokio::test]
    async fn test_closed_room_code_is_reusable() {
        let mut reg = registry(RoomConfig {
            code_attempts: 1,
            ..RoomConfig::default()
        });
        let seeded = || StdRng::seed_from_u64(21);
        let code = reg.generate_code(&mut seeded()).unwrap();

        let room = open_with_code(&mut reg, &code, 1);
        assert!(matches!(
            reg.generate_code(&mut seeded()),
            Err(RoomError::CodeSpaceExhausted { attempts: 1 })
        ));

        assert!(room.leave(UserId(1)).await.unwrap().room_closed);
        assert!(!reg.contains(&code));
        assert_eq!(reg.generate_code(&mut seeded()).unwrap(), code);
    }

    #[tokio::test]
    async fn test_remove_if_closed_keeps_room_that_reused_the_code() {
        let mut reg = registry(RoomConfig::default());
        let code = RoomCode::parse("QRS234").unwrap();

        let first = open_with_code(&mut reg, &code, 1);
        assert!(first.leave(UserId(1)).await.unwrap().room_closed);
        let second = open_with_code(&mut reg, &code, 2);

        assert!(!reg.remove_if_closed(&first));
        assert!(!reg.remove_if_closed(&second));
        assert!(reg.contains(&code));
        assert!(reg.get(&code).unwrap().same_room(&second));

        assert!(second.leave(UserId(2)).await.unwrap().room_closed);
        assert!(reg.remove_if_closed(&second));
        assert!(reg.is_empty());
    }
}
