//! HTTP handlers: identity check, then dispatch to a room actor or the
//! offline session manager.
//!
//! Every endpoint is a JSON `POST` under `/api` carrying the caller's
//! `init_data`. The flow of a room request is:
//!   1. Verify `init_data` → caller identity
//!   2. Look up the room handle (registry lock held only for this)
//!   3. Send the command to the room actor and await its reply
//!   4. Forget the room if the command closed it

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{Method, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use spyglass_protocol::{
    AuthRequest, AuthResponse, Identity, LeaveResponse, LifecycleState, OfflineActionRequest,
    OfflineCloseResponse, OfflineRevealResponse, OfflineStartRequest, OfflineStartResponse,
    OfflineTurnStatus, RoleCard, RoomActionRequest, RoomBotsAddRequest, RoomCode,
    RoomCreateRequest, RoomInfo, StartResponse,
};
use spyglass_room::{RoomAction, RoomError, RoomHandle, RoomSettings};
use spyglass_session::{Authenticator, OfflineSettings};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::SpyglassError;
use crate::server::AppState;

type Shared<A> = State<Arc<AppState<A>>>;
type Body<T> = Result<Json<T>, JsonRejection>;
type Reply<T> = Result<Json<T>, SpyglassError>;

/// Every route of the API, with CORS and request tracing.
pub(crate) fn router<A: Authenticator>(state: Arc<AppState<A>>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth", post(auth::<A>))
        // Online rooms
        .route("/api/room/create", post(room_create::<A>))
        .route("/api/room/join", post(room_join::<A>))
        .route("/api/room/status", post(room_status::<A>))
        .route("/api/room/heartbeat", post(room_heartbeat::<A>))
        .route("/api/room/start", post(room_start::<A>))
        .route("/api/room/restart", post(room_restart::<A>))
        .route("/api/room/lobby", post(room_lobby::<A>))
        .route("/api/room/finish", post(room_finish::<A>))
        .route("/api/room/turn/start", post(room_turn_start::<A>))
        .route("/api/room/turn/finish", post(room_turn_finish::<A>))
        .route("/api/room/resume", post(room_resume::<A>))
        .route("/api/room/leave", post(room_leave::<A>))
        .route("/api/room/role", post(room_role::<A>))
        .route("/api/room/bots/add", post(room_bots_add::<A>))
        .route("/api/room/bots/fill", post(room_bots_fill::<A>))
        .route("/api/room/bots/clear", post(room_bots_clear::<A>))
        // Offline sessions
        .route("/api/offline/start", post(offline_start::<A>))
        .route("/api/offline/reveal", post(offline_reveal::<A>))
        .route("/api/offline/close", post(offline_close::<A>))
        .route("/api/offline/restart", post(offline_restart::<A>))
        .route("/api/offline/turn/status", post(offline_turn_status::<A>))
        .route("/api/offline/turn/start", post(offline_turn_start::<A>))
        .route("/api/offline/turn/finish", post(offline_turn_finish::<A>))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

async fn identify<A: Authenticator>(
    state: &AppState<A>,
    init_data: &str,
) -> Result<Identity, SpyglassError> {
    Ok(state.auth.authenticate(init_data).await?)
}

async fn lookup<A: Authenticator>(
    state: &AppState<A>,
    code: &RoomCode,
) -> Result<RoomHandle, SpyglassError> {
    let mut rooms = state.rooms.lock().await;
    Ok(rooms.get(code)?)
}

async fn forget_if_closed<A: Authenticator>(state: &AppState<A>, room: &RoomHandle) {
    if room.is_closed() {
        state.rooms.lock().await.remove_if_closed(room);
    }
}

/// Fills in the caller-relative `can_manage_bots` flag.
fn with_bot_access<A: Authenticator>(
    state: &AppState<A>,
    identity: &Identity,
    mut info: RoomInfo,
) -> RoomInfo {
    info.can_manage_bots = state.dev.tools_enabled
        && info.state == LifecycleState::Waiting
        && info.you_are_owner
        && state.dev.is_admin(identity);
    info
}

fn require_dev_admin<A: Authenticator>(
    state: &AppState<A>,
    identity: &Identity,
) -> Result<(), SpyglassError> {
    if !state.dev.tools_enabled {
        return Err(SpyglassError::DevToolsDisabled);
    }
    if !state.dev.is_admin(identity) {
        tracing::debug!(user_id = %identity.user_id, "bot request from non-admin");
        return Err(SpyglassError::DevAccessDenied);
    }
    Ok(())
}

/// Runs one snapshot-returning action for the caller.
async fn act<A: Authenticator>(
    state: &AppState<A>,
    request: RoomActionRequest,
    action: RoomAction,
) -> Reply<RoomInfo> {
    let identity = identify(state, &request.init_data).await?;
    act_as(state, &identity, &request.room_code, action).await
}

async fn act_as<A: Authenticator>(
    state: &AppState<A>,
    identity: &Identity,
    code: &RoomCode,
    action: RoomAction,
) -> Reply<RoomInfo> {
    let room = lookup(state, code).await?;
    let result = room.act(identity.user_id, action).await;
    forget_if_closed(state, &room).await;
    Ok(Json(with_bot_access(state, identity, result?)))
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn auth<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<AuthRequest>,
) -> Reply<AuthResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    Ok(Json(AuthResponse {
        user_id: identity.user_id,
        username: identity.username,
        full_name: identity.display_name,
    }))
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

async fn room_create<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomCreateRequest>,
) -> Reply<RoomInfo> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let settings = RoomSettings::from_request(&request)?;
    let (_, info) = state
        .rooms
        .lock()
        .await
        .create(&identity, settings, Utc::now())?;
    Ok(Json(with_bot_access(&state, &identity, info)))
}

async fn room_join<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let room = lookup(&state, &request.room_code).await?;
    let result = room.join(identity.clone()).await;
    forget_if_closed(&state, &room).await;
    Ok(Json(with_bot_access(&state, &identity, result?)))
}

async fn room_status<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::Status).await
}

async fn room_heartbeat<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::Heartbeat).await
}

async fn room_start<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<StartResponse> {
    deal(&state, body?.0, false).await
}

async fn room_restart<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<StartResponse> {
    deal(&state, body?.0, true).await
}

async fn deal<A: Authenticator>(
    state: &AppState<A>,
    request: RoomActionRequest,
    restart: bool,
) -> Reply<StartResponse> {
    let identity = identify(state, &request.init_data).await?;
    let room = lookup(state, &request.room_code).await?;
    let result = if restart {
        room.restart(identity.user_id).await
    } else {
        room.start(identity.user_id).await
    };
    forget_if_closed(state, &room).await;
    Ok(Json(result?))
}

async fn room_lobby<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::Lobby).await
}

async fn room_finish<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::Finish).await
}

async fn room_turn_start<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::TurnStart).await
}

async fn room_turn_finish<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::TurnFinish).await
}

async fn room_resume<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    act(&state, body?.0, RoomAction::Resume).await
}

/// Leaving a room that no longer exists counts as having left a closed
/// room, so clients can always clean up.
async fn room_leave<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<LeaveResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let gone = LeaveResponse {
        left: true,
        room_closed: true,
    };

    let room = match lookup(&state, &request.room_code).await {
        Ok(room) => room,
        Err(SpyglassError::Room(RoomError::NotFound(_))) => return Ok(Json(gone)),
        Err(e) => return Err(e),
    };
    match room.leave(identity.user_id).await {
        Ok(response) => {
            forget_if_closed(&state, &room).await;
            if response.room_closed {
                tracing::info!(room_code = %room.code(), "room closed");
            }
            Ok(Json(response))
        }
        Err(RoomError::Unavailable(_)) => {
            state.rooms.lock().await.remove_if_closed(&room);
            Ok(Json(gone))
        }
        Err(e) => Err(e.into()),
    }
}

async fn room_role<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoleCard> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let room = lookup(&state, &request.room_code).await?;
    let result = room.role(identity.user_id).await;
    forget_if_closed(&state, &room).await;
    Ok(Json(result?))
}

// -- Bots (dev tools) --

async fn room_bots_add<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomBotsAddRequest>,
) -> Reply<RoomInfo> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    require_dev_admin(&state, &identity)?;
    act_as(&state, &identity, &request.room_code, RoomAction::AddBots(request.count)).await
}

async fn room_bots_fill<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    bots(&state, body?.0, RoomAction::FillBots).await
}

async fn room_bots_clear<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<RoomActionRequest>,
) -> Reply<RoomInfo> {
    bots(&state, body?.0, RoomAction::ClearBots).await
}

async fn bots<A: Authenticator>(
    state: &AppState<A>,
    request: RoomActionRequest,
    action: RoomAction,
) -> Reply<RoomInfo> {
    let identity = identify(state, &request.init_data).await?;
    require_dev_admin(state, &identity)?;
    act_as(state, &identity, &request.room_code, action).await
}

// ---------------------------------------------------------------------------
// Offline sessions
// ---------------------------------------------------------------------------

async fn offline_start<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineStartRequest>,
) -> Reply<OfflineStartResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let settings = OfflineSettings::new(
        request.play_mode,
        request.player_count,
        request.random_allowed_modes.as_deref(),
        request.timer_enabled,
        request.turn_time_seconds,
    )?;
    let response = state
        .offline
        .lock()
        .await
        .start(identity.user_id, settings, Utc::now())?;
    Ok(Json(response))
}

async fn offline_reveal<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineRevealResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let sessions = state.offline.lock().await;
    Ok(Json(sessions.reveal(&request.session_id, identity.user_id)?))
}

async fn offline_close<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineCloseResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let mut sessions = state.offline.lock().await;
    Ok(Json(sessions.close(&request.session_id, identity.user_id)?))
}

async fn offline_restart<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineStartResponse> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let mut sessions = state.offline.lock().await;
    Ok(Json(sessions.restart(&request.session_id, identity.user_id)?))
}

async fn offline_turn_status<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineTurnStatus> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let sessions = state.offline.lock().await;
    Ok(Json(sessions.turn_status(
        &request.session_id,
        identity.user_id,
        Utc::now(),
    )?))
}

async fn offline_turn_start<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineTurnStatus> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let mut sessions = state.offline.lock().await;
    Ok(Json(sessions.turn_start(
        &request.session_id,
        identity.user_id,
        Utc::now(),
    )?))
}

async fn offline_turn_finish<A: Authenticator>(
    State(state): Shared<A>,
    body: Body<OfflineActionRequest>,
) -> Reply<OfflineTurnStatus> {
    let Json(request) = body?;
    let identity = identify(&state, &request.init_data).await?;
    let mut sessions = state.offline.lock().await;
    Ok(Json(sessions.turn_finish(
        &request.session_id,
        identity.user_id,
        Utc::now(),
    )?))
}
