/// Errors raised while loading cards or dealing roles.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("need at least {min} players, got {count}")]
    NotEnoughPlayers { count: usize, min: usize },

    /// The mode settings cannot produce a deal (too few scenarios, or none
    /// eligible for this player count).
    #[error("{0}")]
    Configuration(String),

    #[error("card catalog is empty")]
    EmptyCatalog,

    #[error("failed to read card catalog: {0}")]
    CatalogIo(#[from] std::io::Error),

    #[error("failed to parse card catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),
}
