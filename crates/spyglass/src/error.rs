//! Unified error type for the Spyglass server.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use spyglass_protocol::ProtocolError;
use spyglass_roles::RoleError;
use spyglass_room::RoomError;
use spyglass_session::SessionError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically. As a
/// response it becomes `{"error": "<message>"}` with a status chosen by
/// [`status`](Self::status).
#[derive(Debug, thiserror::Error)]
pub enum SpyglassError {
    /// A value from the wire could not be parsed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Identity or offline session error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, invalid state).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Card catalog or deal configuration.
    #[error(transparent)]
    Roles(#[from] RoleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request body was not the expected JSON.
    #[error("{0}")]
    BadRequest(String),

    /// Dev tools are switched off.
    #[error("not found")]
    DevToolsDisabled,

    /// The caller is not a dev admin.
    #[error("dev access denied")]
    DevAccessDenied,

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpyglassError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Room(err) => match err {
                RoomError::NotFound(_) | RoomError::Unavailable(_) => StatusCode::NOT_FOUND,
                RoomError::RoomFull(_) | RoomError::InvalidState(_) => StatusCode::CONFLICT,
                RoomError::NotOwner | RoomError::NotInRoom(..) => StatusCode::FORBIDDEN,
                RoomError::Validation(_) | RoomError::NotEnoughPlayers { .. } => {
                    StatusCode::BAD_REQUEST
                }
                RoomError::Roles(role) => role_status(role),
                RoomError::CodeSpaceExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Session(err) => match err {
                SessionError::IdentityFailed(_) => StatusCode::UNAUTHORIZED,
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::Forbidden => StatusCode::FORBIDDEN,
                SessionError::InvalidState(_) => StatusCode::CONFLICT,
                SessionError::Validation(_) => StatusCode::BAD_REQUEST,
                SessionError::Roles(role) => role_status(role),
                SessionError::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Roles(role) => role_status(role),
            Self::Protocol(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DevToolsDisabled => StatusCode::NOT_FOUND,
            Self::DevAccessDenied => StatusCode::FORBIDDEN,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn role_status(err: &RoleError) -> StatusCode {
    match err {
        RoleError::NotEnoughPlayers { .. } | RoleError::Configuration(_) => {
            StatusCode::BAD_REQUEST
        }
        RoleError::EmptyCatalog | RoleError::CatalogIo(_) | RoleError::CatalogParse(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<JsonRejection> for SpyglassError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for SpyglassError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
