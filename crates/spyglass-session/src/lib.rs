//! Identity and offline sessions for Spyglass.
//!
//! This crate handles the parts of a request that are not about rooms:
//!
//! 1. **Identity**: who is calling ([`Authenticator`] trait, with
//!    [`InitDataAuthenticator`] checking Telegram WebApp signatures).
//! 2. **Offline sessions**: single-device games where the phone is passed
//!    around ([`OfflineSession`], owned by [`OfflineSessionManager`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← authenticates every request, drives offline games
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Clock / Roles / Protocol (below)
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, InitDataAuthenticator, normalize_username, sign_init_data};
pub use error::SessionError;
pub use manager::OfflineSessionManager;
pub use session::{OfflineConfig, OfflineSession, OfflineSettings};
