use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, index};
use rand::{Rng, SeedableRng};
use spyglass_protocol::{MIN_PLAYERS, PlayMode, RoleCard, Scenario};
use tracing::debug;

use crate::catalog::CardCatalog;
use crate::error::RoleError;

/// Outcome of one deal.
#[derive(Debug, Clone)]
pub struct Deal<K> {
    /// The random-mode scenario that was drawn. `None` in standard mode.
    /// Server-side knowledge only.
    pub scenario: Option<Scenario>,
    pub roles: HashMap<K, RoleCard>,
}

impl<K> Deal<K> {
    pub fn spy_count(&self) -> usize {
        self.roles.values().filter(|r| r.is_spy()).count()
    }
}

/// Resolves the scenario set a random-mode game may draw from.
///
/// Duplicates are collapsed first; fewer than two distinct scenarios is a
/// configuration error. `None` allows all of them. Standard mode has no
/// scenarios and ignores the argument.
pub fn allowed_scenarios(
    mode: PlayMode,
    requested: Option<&[Scenario]>,
) -> Result<Vec<Scenario>, RoleError> {
    if mode == PlayMode::Standard {
        return Ok(Vec::new());
    }
    let Some(requested) = requested else {
        return Ok(Scenario::ALL.to_vec());
    };
    let mut unique = Vec::with_capacity(requested.len());
    for scenario in requested {
        if !unique.contains(scenario) {
            unique.push(*scenario);
        }
    }
    if unique.len() < 2 {
        return Err(RoleError::Configuration(
            "pick at least two random scenarios".into(),
        ));
    }
    Ok(unique)
}

/// Deals hidden roles over an ordered list of players.
///
/// Generic over the player key: rooms deal over user ids, offline
/// sessions over seat numbers.
#[derive(Debug, Clone)]
pub struct RoleAssigner {
    catalog: Arc<CardCatalog>,
}

impl RoleAssigner {
    pub fn new(catalog: Arc<CardCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    /// Deals with a fresh OS-seeded generator, so no RNG state is shared
    /// between games.
    pub fn deal<K>(
        &self,
        players: &[K],
        mode: PlayMode,
        allowed: &[Scenario],
    ) -> Result<Deal<K>, RoleError>
    where
        K: Clone + Eq + Hash,
    {
        let mut rng = StdRng::from_os_rng();
        self.deal_with(&mut rng, players, mode, allowed)
    }

    pub fn deal_with<K, R>(
        &self,
        rng: &mut R,
        players: &[K],
        mode: PlayMode,
        allowed: &[Scenario],
    ) -> Result<Deal<K>, RoleError>
    where
        K: Clone + Eq + Hash,
        R: Rng + ?Sized,
    {
        let n = players.len();
        if n < MIN_PLAYERS {
            return Err(RoleError::NotEnoughPlayers {
                count: n,
                min: MIN_PLAYERS,
            });
        }

        let deal = match mode {
            PlayMode::Standard => Deal {
                scenario: None,
                roles: self.spies_and_shared_card(rng, players, 1),
            },
            PlayMode::Random => {
                let scenario = pick_scenario(rng, n, allowed)?;
                let roles = match scenario {
                    Scenario::AllSpies => players
                        .iter()
                        .map(|p| (p.clone(), RoleCard::spy()))
                        .collect(),
                    Scenario::SameCard => self.spies_and_shared_card(rng, players, 0),
                    Scenario::DifferentCards => players
                        .iter()
                        .map(|p| (p.clone(), self.catalog.draw(rng).to_role()))
                        .collect(),
                    Scenario::MultiSpy => {
                        let spies = rng.random_range(2..=n - 1);
                        self.spies_and_shared_card(rng, players, spies)
                    }
                };
                Deal {
                    scenario: Some(scenario),
                    roles,
                }
            }
        };

        debug!(
            players = n,
            %mode,
            scenario = ?deal.scenario,
            spies = deal.spy_count(),
            "roles dealt"
        );
        Ok(deal)
    }

    /// `spies` players chosen without replacement become spies; everyone
    /// else shares one card.
    fn spies_and_shared_card<K, R>(
        &self,
        rng: &mut R,
        players: &[K],
        spies: usize,
    ) -> HashMap<K, RoleCard>
    where
        K: Clone + Eq + Hash,
        R: Rng + ?Sized,
    {
        let spy_seats = index::sample(rng, players.len(), spies);
        let shared = self.catalog.draw(rng).to_role();
        let mut roles: HashMap<K, RoleCard> = players
            .iter()
            .map(|p| (p.clone(), shared.clone()))
            .collect();
        for seat in spy_seats.iter() {
            roles.insert(players[seat].clone(), RoleCard::spy());
        }
        roles
    }
}

/// Uniform draw among the allowed scenarios that fit `players`.
fn pick_scenario<R: Rng + ?Sized>(
    rng: &mut R,
    players: usize,
    allowed: &[Scenario],
) -> Result<Scenario, RoleError> {
    let pool: &[Scenario] = if allowed.is_empty() {
        &Scenario::ALL
    } else {
        allowed
    };
    let mut distinct: Vec<Scenario> = Vec::with_capacity(pool.len());
    for scenario in pool {
        if !distinct.contains(scenario) {
            distinct.push(*scenario);
        }
    }
    if distinct.len() < 2 {
        return Err(RoleError::Configuration(
            "pick at least two random scenarios".into(),
        ));
    }
    let eligible: Vec<Scenario> = distinct
        .into_iter()
        .filter(|s| s.is_eligible(players))
        .collect();
    eligible.choose(rng).copied().ok_or_else(|| {
        RoleError::Configuration(format!("no random scenario fits {players} players"))
    })
}
