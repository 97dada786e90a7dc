//! # Spyglass
//!
//! HTTP backend for a Telegram mini-app spy party game.
//!
//! Players verify themselves with Telegram WebApp `initData`, then either
//! play on one device (offline sessions passed from hand to hand) or in
//! online rooms where every player polls from their own phone. Each room
//! runs as its own actor task; the server only routes requests to it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spyglass::prelude::*;
//!
//! # async fn run() -> Result<(), SpyglassError> {
//! let config = ServerConfig::load(None)?;
//! config.validate()?;
//! let auth = InitDataAuthenticator::from_settings(
//!     config.auth.bot_token.clone(),
//!     config.auth.init_data_bypass,
//! );
//! let server = SpyglassServerBuilder::from_config(&config)?.build(auth).await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
mod handler;
pub mod logger;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::SpyglassError;
pub use server::{SpyglassServer, SpyglassServerBuilder};

pub mod prelude {
    pub use crate::config::{ConfigError, ServerConfig};
    pub use crate::{SpyglassError, SpyglassServer, SpyglassServerBuilder};
    pub use spyglass_session::{Authenticator, InitDataAuthenticator};
}
