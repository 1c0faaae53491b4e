//! P5: cache correctness. With witness sampling forced to certainty, every
//! cached encounter outcome must match a fresh recomputation from the same
//! canonical state.

use std::collections::BTreeMap;

use mince::{Config, Engine, EpochData};

fn epoch(tapes: &[u64]) -> EpochData {
    EpochData {
        epoch_num: 0,
        tapes: tapes.iter().map(|t| (*t, [0u8; 64])).collect(),
        interactions: Vec::new(),
        metrics: BTreeMap::new(),
    }
}

#[test]
fn p5_witness_sampled_recomputation_matches_cache_on_a_multi_tick_run() {
    let mut config = Config::default();
    config.cache.witness_sample_rate = 1.0;

    let mut engine = Engine::new(config, 13).unwrap();
    engine.initialize(&epoch(&(0..40).collect::<Vec<_>>())).unwrap();
    for tick in 0..15 {
        engine.process_tick(tick, &epoch(&[])).unwrap();
    }

    assert!(engine.witness_count() > 0, "witness_sample_rate=1.0 over 15 ticks should have sampled at least one witness");
    assert_eq!(engine.validate_cache_witnesses(), 0);
}
