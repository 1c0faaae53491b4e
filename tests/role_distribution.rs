//! P10: within every phase, agents are visited in sorted id order. Role
//! distribution itself (P8) is already covered by `registry`'s inline
//! `p8_role_distribution_within_rounding_tolerance` test; this file checks
//! iteration order as observed through the engine's emitted events.

use std::collections::BTreeMap;

use mince::{Config, Engine, EpochData, EventKind};

fn epoch(tapes: &[u64]) -> EpochData {
    EpochData {
        epoch_num: 0,
        tapes: tapes.iter().map(|t| (*t, [0u8; 64])).collect(),
        interactions: Vec::new(),
        metrics: BTreeMap::new(),
    }
}

#[test]
fn p10_trade_phase_visits_kings_in_sorted_id_order() {
    let mut config = Config::default();
    // Every King starts well above invest_per_tick so every King trades
    // every tick; no trade is skipped for insufficient funds.
    config.roles.initial_currency.king = mince::config::Range::new(10_000, 10_000);

    let mut engine = Engine::new(config, 21).unwrap();
    engine.initialize(&epoch(&(0..80).collect::<Vec<_>>())).unwrap();
    let result = engine.process_tick(0, &epoch(&[])).unwrap();

    let king_ids: Vec<&str> = result
        .events
        .iter()
        .filter(|e| e.kind == EventKind::Trade)
        .filter_map(|e| e.king.as_deref())
        .collect();

    assert!(!king_ids.is_empty(), "expected at least one trade event");
    let mut sorted = king_ids.clone();
    sorted.sort_unstable();
    assert_eq!(king_ids, sorted, "trade events must be emitted in sorted king-id order");
}
