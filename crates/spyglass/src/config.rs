//! Server configuration: an optional TOML file, then environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use spyglass_protocol::Identity;
use spyglass_room::RoomConfig;
use spyglass_session::{OfflineConfig, normalize_username};

/// File read when no `--config` is given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "spyglass.toml";

/// Errors while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level server configuration, loaded from `spyglass.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthConfig,
    pub dev: DevConfig,
    pub rooms: RoomsConfig,
    pub offline: OfflineSection,
    pub cards: CardsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            auth: AuthConfig::default(),
            dev: DevConfig::default(),
            rooms: RoomsConfig::default(),
            offline: OfflineSection::default(),
            cards: CardsConfig::default(),
        }
    }
}

/// Identity verification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Telegram bot token used to check `initData` signatures.
    pub bot_token: Option<String>,
    /// Skip signature checks. Local development only.
    pub init_data_bypass: bool,
}

/// Developer tools (bots in rooms).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevConfig {
    pub tools_enabled: bool,
    pub admin_ids: Vec<i64>,
    pub admin_usernames: Vec<String>,
}

impl DevConfig {
    /// Whether `identity` is on the dev-admin allow list, by id or by
    /// handle.
    pub fn is_admin(&self, identity: &Identity) -> bool {
        if self.admin_ids.contains(&identity.user_id.0) {
            return true;
        }
        let Some(username) = identity.username.as_deref() else {
            return false;
        };
        self.admin_usernames
            .iter()
            .filter_map(|name| normalize_username(Some(name.as_str())))
            .any(|name| name == username)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Silence after which a player in a running round counts as gone.
    /// Zero disables eviction.
    pub stale_after_secs: u64,
    pub waiting_ttl_secs: u64,
    pub code_attempts: u32,
    pub channel_size: usize,
    pub room_debug: bool,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        let defaults = RoomConfig::default();
        Self {
            stale_after_secs: defaults.stale_after.as_secs(),
            waiting_ttl_secs: defaults.waiting_ttl.as_secs(),
            code_attempts: defaults.code_attempts,
            channel_size: defaults.channel_size,
            room_debug: defaults.room_debug,
        }
    }
}

impl RoomsConfig {
    pub fn to_room_config(&self) -> RoomConfig {
        RoomConfig {
            stale_after: Duration::from_secs(self.stale_after_secs),
            waiting_ttl: Duration::from_secs(self.waiting_ttl_secs),
            code_attempts: self.code_attempts,
            channel_size: self.channel_size,
            room_debug: self.room_debug,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineSection {
    pub session_ttl_secs: u64,
}

impl Default for OfflineSection {
    fn default() -> Self {
        Self {
            session_ttl_secs: OfflineConfig::default().session_ttl.as_secs(),
        }
    }
}

impl OfflineSection {
    pub fn to_offline_config(&self) -> OfflineConfig {
        OfflineConfig {
            session_ttl: Duration::from_secs(self.session_ttl_secs),
        }
    }
}

/// Card catalog source. The built-in catalog is used when unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CardsConfig {
    pub catalog_path: Option<PathBuf>,
    /// Where card images are served from. Cards without their own
    /// `image_url` get `{image_base_url}/{id}.png`. The built-in catalog
    /// ships without URLs, so roles carry no image unless this is set.
    pub image_base_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] if it exists, then applies
    /// environment overrides.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                tracing::info!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`. Empty values
    /// are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("SPYGLASS_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(token) = get("BOT_TOKEN") {
            self.auth.bot_token = Some(token);
        }
        if let Some(flag) = get("INIT_DATA_BYPASS") {
            self.auth.init_data_bypass = parse_flag(&flag);
        }
        if let Some(flag) = get("DEV_TOOLS_ENABLED") {
            self.dev.tools_enabled = parse_flag(&flag);
        }
        for key in ["DEV_ADMIN_IDS", "DEV_ADMIN_TG_ID"] {
            if let Some(raw) = get(key) {
                self.dev.admin_ids.extend(parse_ids(&raw));
            }
        }
        for key in ["DEV_ADMIN_USERNAMES", "DEV_ADMIN_TG_USERNAME"] {
            if let Some(raw) = get(key) {
                self.dev.admin_usernames.extend(
                    raw.split(',')
                        .filter_map(|chunk| normalize_username(Some(chunk))),
                );
            }
        }
        if let Some(flag) = get("ROOM_DEBUG") {
            self.rooms.room_debug = parse_flag(&flag);
        }
        if let Some(path) = get("SPYGLASS_CARDS_PATH") {
            self.cards.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(base) = get("SPYGLASS_CARD_IMAGE_BASE") {
            self.cards.image_base_url = Some(base);
        }
    }

    /// Rejects settings the server cannot run with. Risky but workable
    /// settings are only logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "listen_addr {:?} is not a socket address",
                self.listen_addr
            )));
        }
        if self.rooms.code_attempts == 0 {
            return Err(ConfigError::Invalid("rooms.code_attempts must be > 0".into()));
        }
        if self.rooms.waiting_ttl_secs == 0 {
            return Err(ConfigError::Invalid("rooms.waiting_ttl_secs must be > 0".into()));
        }
        if self.rooms.channel_size == 0 {
            return Err(ConfigError::Invalid("rooms.channel_size must be > 0".into()));
        }
        if self.offline.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("offline.session_ttl_secs must be > 0".into()));
        }

        if self.auth.init_data_bypass {
            tracing::warn!("init_data_bypass is on, identities are not verified");
        } else if self.auth.bot_token.as_deref().is_none_or(str::is_empty) {
            tracing::warn!("no bot token configured, every identity check will fail");
        }
        if self.rooms.stale_after_secs == 0 {
            tracing::warn!("stale player eviction is disabled");
        }
        if self.dev.tools_enabled
            && self.dev.admin_ids.is_empty()
            && self.dev.admin_usernames.is_empty()
        {
            tracing::warn!("dev tools enabled but no dev admins configured");
        }
        if self.cards.catalog_path.is_none() && self.cards.image_base_url.is_none() {
            tracing::warn!("cards.image_base_url unset, roles will carry no card images");
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| match chunk.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = chunk, "skipping invalid dev admin id");
                None
            }
        })
        .collect()
}
