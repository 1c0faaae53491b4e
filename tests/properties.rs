//! Property tests quantifying over inputs: non-negativity (P1),
//! canonical-state invariance under permutation (P4), probability bounds
//! (P6), and sigmoid symmetry (P9).

use std::collections::BTreeMap;

use mince::cache::Cache;
use mince::economics::{p_knight_win, sigmoid};
use mince::{Agent, Config, Engine, EpochData, Role, WealthTraits};
use proptest::prelude::*;

fn epoch(tapes: &[u64]) -> EpochData {
    EpochData {
        epoch_num: 0,
        tapes: tapes.iter().map(|t| (*t, [0u8; 64])).collect(),
        interactions: Vec::new(),
        metrics: BTreeMap::new(),
    }
}

fn agent_with_wealth(id: &str, role: Role, currency: u64, traits: [i64; 7]) -> Agent {
    let wealth = WealthTraits::try_new(traits).unwrap();
    Agent::new(id.to_string(), 0, role, currency, wealth).unwrap()
}

proptest! {
    /// P1: currency and every wealth trait stay non-negative across an
    /// arbitrary-length run, even when near-zero starting balances push
    /// every transfer path toward its own underflow guard. The fields are
    /// `u64`, so the interesting failure mode is a saturating-subtraction
    /// bug causing a panic, not a negative value slipping through.
    #[test]
    fn p1_currency_and_wealth_never_underflow_near_zero_balances(
        seed in any::<u64>(),
        population in 2u64..80,
        ticks in 1u64..12,
    ) {
        let mut cfg = Config::default();
        cfg.roles.initial_currency.king = mince::config::Range::new(0, 5);
        cfg.roles.initial_currency.knight = mince::config::Range::new(0, 5);
        cfg.roles.initial_currency.mercenary = mince::config::Range::new(0, 5);
        cfg.roles.initial_wealth.king = mince::config::Range::new(0, 2);
        cfg.roles.initial_wealth.knight = mince::config::Range::new(0, 2);
        cfg.roles.initial_wealth.mercenary = mince::config::Range::new(0, 2);
        cfg.roles.retainer_fee_range = mince::config::Range::new(20, 30);
        cfg.roles.bribe_threshold_range = mince::config::Range::new(0, 1);

        let mut engine = Engine::new(cfg, seed).unwrap();
        engine.initialize(&epoch(&(0..population).collect::<Vec<_>>())).unwrap();
        for tick in 0..ticks {
            let result = engine.process_tick(tick, &epoch(&[])).unwrap();
            for snap in &result.snapshots {
                prop_assert!(snap.currency < u64::MAX / 2, "currency underflowed to a huge wraparound value");
                prop_assert!(snap.wealth_total < u64::MAX / 2, "wealth underflowed to a huge wraparound value");
            }
        }
    }

    /// P4: the canonical-state cache key is invariant under any
    /// permutation of the agent slice it is computed over.
    #[test]
    fn p4_canonical_key_is_permutation_invariant(
        shuffle_seed in any::<u64>(),
        n in 1usize..8,
    ) {
        let cfg = Config::default();
        let agents: Vec<Agent> = (0..n)
            .map(|i| agent_with_wealth(&format!("K-{i:02}"), Role::King, u64::from(i as u32) * 10, [1, 2, 3, 4, 5, 6, 7]))
            .collect();
        let refs: Vec<&Agent> = agents.iter().collect();
        let original = Cache::canonical_key(&refs, &cfg);

        let mut permuted = refs.clone();
        // deterministic pseudo-shuffle: no RNG crate, no real randomness
        // needed, just a varied ordering driven by the proptest input.
        let shift = shuffle_seed as usize % n;
        permuted.rotate_left(shift);

        let rotated = Cache::canonical_key(&permuted, &cfg);
        prop_assert_eq!(original, rotated);
    }

    /// P6: `p_knight_win` always lands within the configured clamp bounds,
    /// regardless of how lopsided the inputs are.
    #[test]
    fn p6_p_knight_win_stays_within_clamp_bounds(
        knight_defend in 0i64..500,
        knight_sense in 0i64..500,
        knight_adapt in 0i64..500,
        merc_raid in 0i64..500,
        merc_sense in 0i64..500,
        merc_adapt in 0i64..500,
        employed in any::<bool>(),
    ) {
        let cfg = Config::default();
        let mut knight = agent_with_wealth("N-01", Role::Knight, 100, [0, 0, knight_defend, 0, 0, knight_sense, knight_adapt]);
        if employed {
            knight.employer = Some("K-01".to_string());
        }
        let merc = agent_with_wealth("M-01", Role::Mercenary, 0, [0, 0, 0, merc_raid, 0, merc_sense, merc_adapt]);
        let king = agent_with_wealth("K-01", Role::King, 5000, [1, 2, 3, 4, 5, 6, 7]);

        let p = p_knight_win(&knight, &merc, &king, &cfg);
        prop_assert!(p >= cfg.economic.defend_resolution.clamp_min - 1e-9);
        prop_assert!(p <= cfg.economic.defend_resolution.clamp_max + 1e-9);
    }

    /// P9: the logistic sigmoid is point-symmetric about `(0, 0.5)` for
    /// every `|x| <= 40`.
    #[test]
    fn p9_sigmoid_is_symmetric_about_zero(x in -40.0f64..=40.0) {
        let lhs = sigmoid(-x);
        let rhs = 1.0 - sigmoid(x);
        prop_assert!((lhs - rhs).abs() < 1e-9);
    }
}
