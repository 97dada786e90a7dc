//! Property tests for role dealing.
//!
//! Every property runs over player counts 3..=12 and arbitrary seeds fed
//! to a `StdRng`, so failures shrink to a reproducible seed.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use spyglass_protocol::{PlayMode, Role, Scenario, UserId};
use spyglass_roles::{CardCatalog, RoleAssigner, RoleError};

// =========================================================================
// Helpers
// =========================================================================

fn assigner() -> RoleAssigner {
    RoleAssigner::new(Arc::new(CardCatalog::builtin().unwrap()))
}

fn players(n: usize) -> Vec<UserId> {
    (1..=n as i64).map(|i| UserId(1000 + i)).collect()
}

// =========================================================================
// Properties
// =========================================================================

proptest! {
    #[test]
    fn prop_standard_has_exactly_one_spy(n in 3usize..=12, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let roster = players(n);
        let deal = assigner().deal_with(&mut rng, &roster, PlayMode::Standard, &[]).unwrap();

        prop_assert_eq!(deal.roles.len(), n);
        prop_assert_eq!(deal.spy_count(), 1);
        let cards: HashSet<_> = deal.roles.values().filter_map(|r| r.card.clone()).collect();
        prop_assert_eq!(cards.len(), 1, "all non-spies share one card");
        for role in deal.roles.values() {
            if role.role == Role::Spy {
                prop_assert!(role.card.is_none() && role.elixir_cost.is_none() && role.image_url.is_none());
            }
        }
    }

    #[test]
    fn prop_multi_spy_count_in_range(n in 4usize..=12, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let roster = players(n);
        let deal = assigner()
            .deal_with(&mut rng, &roster, PlayMode::Random, &[Scenario::MultiSpy, Scenario::AllSpies])
            .unwrap();
        if deal.scenario == Some(Scenario::MultiSpy) {
            let spies = deal.spy_count();
            prop_assert!((2..=n - 1).contains(&spies), "spies={} n={}", spies, n);
            let cards: HashSet<_> = deal.roles.values().filter_map(|r| r.card.clone()).collect();
            prop_assert_eq!(cards.len(), 1);
        } else {
            prop_assert_eq!(deal.spy_count(), n);
        }
    }

    #[test]
    fn prop_multi_spy_never_at_three(seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let deal = assigner()
            .deal_with(&mut rng, &players(3), PlayMode::Random, &[Scenario::MultiSpy, Scenario::DifferentCards])
            .unwrap();
        prop_assert_eq!(deal.scenario, Some(Scenario::DifferentCards));
    }

    #[test]
    fn prop_different_cards_gives_everyone_a_card(n in 3usize..=12, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let deal = assigner()
            .deal_with(&mut rng, &players(n), PlayMode::Random, &[Scenario::DifferentCards, Scenario::SameCard])
            .unwrap();
        let with_card = deal.roles.values().filter(|r| r.card.is_some()).count();
        prop_assert_eq!(with_card, n);
        prop_assert_eq!(deal.spy_count(), 0);
    }

    #[test]
    fn prop_roles_cover_exactly_the_roster(n in 3usize..=12, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let roster = players(n);
        let deal = assigner().deal_with(&mut rng, &roster, PlayMode::Random, &[]).unwrap();
        let keys: HashSet<_> = deal.roles.keys().copied().collect();
        let expected: HashSet<_> = roster.iter().copied().collect();
        prop_assert_eq!(keys, expected);
    }
}

// =========================================================================
// Fixed cases
// =========================================================================

#[test]
fn test_same_card_scenario_shape() {
    let mut rng = StdRng::seed_from_u64(99);
    let deal = assigner()
        .deal_with(
            &mut rng,
            &players(5),
            PlayMode::Random,
            &[Scenario::SameCard, Scenario::MultiSpy],
        )
        .unwrap();
    match deal.scenario {
        Some(Scenario::SameCard) => assert_eq!(deal.spy_count(), 0),
        Some(Scenario::MultiSpy) => assert!(deal.spy_count() >= 2),
        other => panic!("unexpected scenario {other:?}"),
    }
}

#[test]
fn test_repeated_single_scenario_fails() {
    let err = assigner()
        .deal(&players(3), PlayMode::Random, &[Scenario::MultiSpy, Scenario::MultiSpy])
        .unwrap_err();
    assert!(matches!(err, RoleError::Configuration(_)), "got {err:?}");
}

#[test]
fn test_os_seeded_deal_works() {
    let deal = assigner()
        .deal(&players(8), PlayMode::Standard, &[])
        .unwrap();
    assert_eq!(deal.roles.len(), 8);
}

#[test]
fn test_single_card_catalog() {
    let catalog = CardCatalog::from_json(r#"[{"id": "zap", "name": "Zap", "elixir_cost": 2}]"#).unwrap();
    let assigner = RoleAssigner::new(Arc::new(catalog));
    let mut rng = StdRng::seed_from_u64(5);
    let deal = assigner
        .deal_with(&mut rng, &players(4), PlayMode::Random, &[Scenario::DifferentCards, Scenario::SameCard])
        .unwrap();
    for role in deal.roles.values() {
        assert_eq!(role.card.as_deref(), Some("Zap"));
        assert_eq!(role.elixir_cost, Some(2));
    }
}
