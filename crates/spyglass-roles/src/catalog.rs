use std::path::Path;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use spyglass_protocol::RoleCard;

use crate::error::RoleError;

const BUILTIN_CARDS: &str = include_str!("../data/cards.json");

/// One card a non-spy can be dealt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub elixir_cost: Option<u32>,
}

impl Card {
    /// The role entry of a player holding this card.
    pub fn to_role(&self) -> RoleCard {
        RoleCard::card(self.name.clone(), self.image_url.clone(), self.elixir_cost)
    }
}

/// The deck cards are drawn from. Never empty.
#[derive(Debug, Clone)]
pub struct CardCatalog {
    cards: Vec<Card>,
}

impl CardCatalog {
    pub fn new(cards: Vec<Card>) -> Result<Self, RoleError> {
        if cards.is_empty() {
            return Err(RoleError::EmptyCatalog);
        }
        Ok(Self { cards })
    }

    /// The catalog compiled into the crate.
    pub fn builtin() -> Result<Self, RoleError> {
        Self::from_json(BUILTIN_CARDS)
    }

    /// Loads a JSON array of cards from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RoleError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.as_ref().display(),
            cards = catalog.len(),
            "card catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, RoleError> {
        let cards: Vec<Card> = serde_json::from_str(raw)?;
        Self::new(cards)
    }

    /// Points every card without an image at `{base}/{id}.png`. Cards that
    /// already carry a URL keep it.
    pub fn with_image_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        for card in self.cards.iter_mut().filter(|c| c.image_url.is_none()) {
            card.image_url = Some(format!("{base}/{}.png", card.id));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Draws one card uniformly.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &Card {
        // `new` rejects empty decks, so `choose` always finds a card.
        self.cards.choose(rng).unwrap_or(&self.cards[0])
    }
}
