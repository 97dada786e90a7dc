//! Hidden-role dealing for Spyglass.
//!
//! - [`CardCatalog`]: the deck non-spies draw from, loaded from JSON (a
//!   file, or the catalog compiled into this crate).
//! - [`RoleAssigner`]: turns an ordered player list plus the play mode
//!   into a [`Deal`]. Pure apart from the random generator it is handed.

mod assigner;
mod catalog;
mod error;

pub use assigner::{Deal, RoleAssigner, allowed_scenarios};
pub use catalog::{Card, CardCatalog};
pub use error::RoleError;
