//! Room actor: an isolated Tokio task that owns one [`Room`].
//!
//! Every operation on a room is a command sent through its bounded mpsc
//! channel, with a oneshot reply. The actor handles one command at a
//! time, so two joins racing for the last seat are simply serialised.
//! The actor stops when the room closes or it is told to shut down.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use spyglass_protocol::{
    Identity, LeaveResponse, LifecycleState, RoleCard, RoomCode, RoomInfo, StartResponse, UserId,
};
use spyglass_roles::RoleAssigner;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{Room, RoomError};

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Owner and member actions that answer with a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    Status,
    Heartbeat,
    Lobby,
    Finish,
    TurnStart,
    TurnFinish,
    Resume,
    AddBots(u32),
    FillBots,
    ClearBots,
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        identity: Identity,
        reply: Reply<RoomInfo>,
    },
    Act {
        user_id: UserId,
        action: RoomAction,
        reply: Reply<RoomInfo>,
    },
    /// `start`, or `restart` when the flag is set.
    Deal {
        user_id: UserId,
        restart: bool,
        reply: Reply<StartResponse>,
    },
    Role {
        user_id: UserId,
        reply: Reply<RoleCard>,
    },
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<LeaveResponse>,
    },
    Shutdown,
}

/// What the actor publishes after every command, readable without a
/// round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Published {
    state: LifecycleState,
    closed: bool,
    last_activity: DateTime<Utc>,
}

/// Handle to a running room actor.
///
/// Cheap to clone. The [`RoomRegistry`](crate::RoomRegistry) holds one per
/// room; request handlers clone it out and talk to the room without
/// holding the registry lock.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
    published: watch::Receiver<Published>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Lifecycle state as of the last command the actor finished.
    pub fn state(&self) -> LifecycleState {
        self.published.borrow().state
    }

    /// When the actor last handled a command, or the creation time if it
    /// has handled none.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.published.borrow().last_activity
    }

    /// Whether the room closed or its actor stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed() || self.published.borrow().closed
    }

    /// Whether both handles talk to the same actor. Codes are reused once a
    /// room closes, so the code alone does not identify a room.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    pub async fn join(&self, identity: Identity) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Join { identity, reply })
            .await
    }

    pub async fn act(&self, user_id: UserId, action: RoomAction) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Act {
            user_id,
            action,
            reply,
        })
        .await
    }

    pub async fn status(&self, user_id: UserId) -> Result<RoomInfo, RoomError> {
        self.act(user_id, RoomAction::Status).await
    }

    pub async fn start(&self, user_id: UserId) -> Result<StartResponse, RoomError> {
        self.request(|reply| RoomCommand::Deal {
            user_id,
            restart: false,
            reply,
        })
        .await
    }

    pub async fn restart(&self, user_id: UserId) -> Result<StartResponse, RoomError> {
        self.request(|reply| RoomCommand::Deal {
            user_id,
            restart: true,
            reply,
        })
        .await
    }

    pub async fn role(&self, user_id: UserId) -> Result<RoleCard, RoomError> {
        self.request(|reply| RoomCommand::Role { user_id, reply })
            .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<LeaveResponse, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leave {
                user_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }

    /// Non-blocking shutdown for callers that cannot await. Returns whether
    /// the command was queued.
    pub(crate) fn try_shutdown(&self) -> bool {
        self.sender.try_send(RoomCommand::Shutdown).is_ok()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.code.clone())
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    assigner: RoleAssigner,
    receiver: mpsc::Receiver<RoomCommand>,
    published: watch::Sender<Published>,
}

impl RoomActor {
    /// Processes commands until the room closes or shuts down.
    async fn run(mut self) {
        tracing::info!(room_code = %self.room.code(), "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            let now = Utc::now();
            match cmd {
                RoomCommand::Join { identity, reply } => {
                    let result = self
                        .room
                        .join(&identity, now)
                        .map(|()| self.room.snapshot(identity.user_id, now));
                    self.publish(now);
                    let _ = reply.send(result);
                }
                RoomCommand::Act {
                    user_id,
                    action,
                    reply,
                } => {
                    let result = self.act(user_id, action, now);
                    self.publish(now);
                    let _ = reply.send(result);
                }
                RoomCommand::Deal {
                    user_id,
                    restart,
                    reply,
                } => {
                    let mut rng = StdRng::from_os_rng();
                    let result = if restart {
                        self.room.restart(user_id, &self.assigner, &mut rng, now)
                    } else {
                        self.room.start(user_id, &self.assigner, &mut rng, now)
                    };
                    self.publish(now);
                    let _ = reply.send(result);
                }
                RoomCommand::Role { user_id, reply } => {
                    let result = self.room.role(user_id, now);
                    self.publish(now);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { user_id, reply } => {
                    let result = self.room.leave(user_id, now);
                    self.publish(now);
                    let _ = reply.send(result);
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_code = %self.room.code(), "room shutting down");
                    break;
                }
            }
            if self.room.is_closed() {
                break;
            }
        }

        tracing::info!(room_code = %self.room.code(), "room actor stopped");
    }

    fn act(
        &mut self,
        user_id: UserId,
        action: RoomAction,
        now: DateTime<Utc>,
    ) -> Result<RoomInfo, RoomError> {
        match action {
            RoomAction::Status | RoomAction::Heartbeat => self.room.touch(user_id, now)?,
            RoomAction::Lobby => self.room.lobby(user_id, now)?,
            RoomAction::Finish => self.room.finish(user_id, now)?,
            RoomAction::TurnStart => self.room.turn_start(user_id, now)?,
            RoomAction::TurnFinish => self.room.turn_finish(user_id, now)?,
            RoomAction::Resume => self.room.resume(user_id, now)?,
            RoomAction::AddBots(count) => {
                self.room.add_bots(user_id, count, now)?;
            }
            RoomAction::FillBots => {
                self.room.fill_bots(user_id, now)?;
            }
            RoomAction::ClearBots => {
                self.room.clear_bots(user_id, now)?;
            }
        }
        Ok(self.room.snapshot(user_id, now))
    }

    fn publish(&self, now: DateTime<Utc>) {
        self.published.send_replace(Published {
            state: self.room.state(),
            closed: self.room.is_closed(),
            last_activity: now,
        });
    }
}

/// Spawns a room actor task and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_room(room: Room, assigner: RoleAssigner, channel_size: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));
    let (published_tx, published_rx) = watch::channel(Published {
        state: room.state(),
        closed: room.is_closed(),
        last_activity: room.created_at(),
    });
    let handle = RoomHandle {
        code: room.code().clone(),
        sender: tx,
        published: published_rx,
    };

    let actor = RoomActor {
        room,
        assigner,
        receiver: rx,
        published: published_tx,
    };
    tokio::spawn(actor.run());

    handle
}
