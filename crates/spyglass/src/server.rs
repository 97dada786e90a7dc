//! `SpyglassServer` builder and serve loop.
//!
//! This is the entry point for running a Spyglass backend. It ties
//! together all the layers: identity → HTTP handlers → rooms and offline
//! sessions.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use spyglass_roles::{CardCatalog, RoleAssigner};
use spyglass_room::{RoomConfig, RoomRegistry};
use spyglass_session::{Authenticator, OfflineConfig, OfflineSessionManager};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::SpyglassError;
use crate::config::{DevConfig, ServerConfig};
use crate::handler::router;

/// Shared state handed to every request handler.
///
/// Both maps sit behind their own `Mutex`. The room lock is only held to
/// look up, insert or remove a handle, never while a room command runs.
pub(crate) struct AppState<A: Authenticator> {
    pub(crate) rooms: Mutex<RoomRegistry>,
    pub(crate) offline: Mutex<OfflineSessionManager>,
    pub(crate) auth: A,
    pub(crate) dev: DevConfig,
}

/// Builder for configuring and starting a Spyglass server.
///
/// # Example
///
/// ```rust,ignore
/// let server = SpyglassServer::builder()
///     .bind("127.0.0.1:8000")
///     .build(InitDataAuthenticator::new(token))
///     .await?;
/// server.run().await
/// ```
pub struct SpyglassServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    offline_config: OfflineConfig,
    dev: DevConfig,
    catalog: Option<Arc<CardCatalog>>,
}

impl SpyglassServerBuilder {
    /// Creates a new builder with default settings and the built-in
    /// card catalog.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            room_config: RoomConfig::default(),
            offline_config: OfflineConfig::default(),
            dev: DevConfig::default(),
            catalog: None,
        }
    }

    /// A builder carrying everything in `config` except the authenticator.
    /// Loads the card catalog and applies the image base URL.
    pub fn from_config(config: &ServerConfig) -> Result<Self, SpyglassError> {
        let mut builder = Self::new()
            .bind(&config.listen_addr)
            .room_config(config.rooms.to_room_config())
            .offline_config(config.offline.to_offline_config())
            .dev_config(config.dev.clone());
        let mut catalog = match &config.cards.catalog_path {
            Some(path) => CardCatalog::from_path(path)?,
            None => CardCatalog::builtin()?,
        };
        if let Some(base) = &config.cards.image_base_url {
            catalog = catalog.with_image_base(base);
        }
        builder = builder.catalog(Arc::new(catalog));
        Ok(builder)
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn offline_config(mut self, config: OfflineConfig) -> Self {
        self.offline_config = config;
        self
    }

    pub fn dev_config(mut self, dev: DevConfig) -> Self {
        self.dev = dev;
        self
    }

    pub fn catalog(mut self, catalog: Arc<CardCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Binds the listener and assembles the router with the given
    /// authenticator.
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<SpyglassServer, SpyglassError> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(CardCatalog::builtin()?),
        };
        let assigner = RoleAssigner::new(catalog);

        let state = Arc::new(AppState {
            rooms: Mutex::new(RoomRegistry::new(assigner.clone(), self.room_config)),
            offline: Mutex::new(OfflineSessionManager::new(assigner, self.offline_config)),
            auth,
            dev: self.dev,
        });

        let listener = TcpListener::bind(&self.bind_addr).await?;
        Ok(SpyglassServer {
            listener,
            router: router(state),
        })
    }
}

impl Default for SpyglassServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Spyglass server.
///
/// Call [`run()`](Self::run) to start answering requests.
pub struct SpyglassServer {
    listener: TcpListener,
    router: Router,
}

impl SpyglassServer {
    pub fn builder() -> SpyglassServerBuilder {
        SpyglassServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), SpyglassError> {
        tracing::info!(addr = %self.local_addr()?, "spyglass server running");
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Serves until `shutdown` resolves, then lets in-flight requests
    /// finish.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), SpyglassError> {
        tracing::info!(addr = %self.local_addr()?, "spyglass server running");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("spyglass server stopped");
        Ok(())
    }
}
