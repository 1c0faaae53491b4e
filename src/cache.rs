//! Canonical-state cache: memoizes deterministic encounter outcomes keyed
//! by a hash of the participating agents plus the config.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::Agent;

/// Running counters exposed by [`Cache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of `get_or_compute` calls resolved from the cache.
    pub hits: u64,
    /// Number of `get_or_compute` calls that invoked the compute function.
    pub misses: u64,
    /// Number of entries evicted to stay within `max_size`.
    pub evictions: u64,
    /// Number of `invalidate` calls.
    pub invalidations: u64,
    /// Current entry count.
    pub size: usize,
}

struct Entry {
    key: String,
    value: f64,
    witness: Option<(Vec<(String, u64, [u64; 7])>, f64)>,
}

/// An LRU cache over canonical-state keys, with optional witness sampling
/// for offline validation that cached values match recomputation.
pub struct Cache {
    max_size: usize,
    witness_sample_rate: f64,
    order: VecDeque<Entry>,
    stats: CacheStats,
}

impl Cache {
    /// Builds a cache from the given config's `[cache]` section.
    #[must_use]
    pub fn new(cfg: &Config) -> Self {
        Self {
            max_size: cfg.cache.max_size,
            witness_sample_rate: cfg.cache.witness_sample_rate,
            order: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    /// Computes the canonical-state key for `agents` combined with the
    /// config's content hash: first 16 hex chars of SHA-256 over a stable
    /// byte serialization, invariant under the input ordering of `agents`.
    #[must_use]
    pub fn canonical_key(agents: &[&Agent], cfg: &Config) -> String {
        let mut rows: Vec<(String, &'static str, u64, [u64; 7])> = agents
            .iter()
            .map(|a| {
                (
                    a.id.clone(),
                    a.role.id_prefix(),
                    a.currency,
                    [
                        a.wealth.compute,
                        a.wealth.copy,
                        a.wealth.defend,
                        a.wealth.raid,
                        a.wealth.trade,
                        a.wealth.sense,
                        a.wealth.adapt,
                    ],
                )
        })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        hasher.update(cfg.content_hash().as_bytes());
        for (id, prefix, currency, wealth) in &rows {
            hasher.update(id.as_bytes());
            hasher.update(prefix.as_bytes());
            hasher.update(currency.to_le_bytes());
            for w in wealth {
                hasher.update(w.to_le_bytes());
            }
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Looks up `key`; on a miss, calls `f`, stores the result (moving it to
    /// MRU position either way), and evicts the LRU entry if over
    /// `max_size`.
    pub fn get_or_compute<F: FnOnce() -> f64>(&mut self, key: &str, f: F) -> f64 {
        if let Some(pos) = self.order.iter().position(|e| e.key == key) {
            #[allow(clippy::expect_used)]
            let entry = self.order.remove(pos).expect("position just found");
            let value = entry.value;
            self.order.push_back(entry);
            self.stats.hits += 1;
            return value;
        }

        let value = f();
        self.stats.misses += 1;
        self.order.push_back(Entry {
                key: key.to_string(),
                value,
                witness: None,
        });
        if self.order.len() > self.max_size {
            self.order.pop_front();
            self.stats.evictions += 1;
        }
        self.stats.size = self.order.len();
        value
    }

    /// Samples a witness for `key` with probability `witness_sample_rate`,
    /// recording `agents_snapshot` (the canonical rows that produced
    /// `value`) alongside it for later validation.
    pub fn maybe_witness(&mut self, key: &str, agents: &[&Agent], value: f64, roll: f64) {
        if roll >= self.witness_sample_rate {
            return;
        }
        if let Some(pos) = self.order.iter().position(|e| e.key == key) {
            let rows = agents
                .iter()
                .map(|a| {
                    (
                        a.id.clone(),
                        a.currency,
                        [
                            a.wealth.compute,
                            a.wealth.copy,
                            a.wealth.defend,
                            a.wealth.raid,
                            a.wealth.trade,
                            a.wealth.sense,
                            a.wealth.adapt,
                        ],
                    )
            })
                .collect();
            self.order[pos].witness = Some((rows, value));
        }
    }

    /// Recomputes every sampled witness via `recompute_fn` and asserts
    /// equality against the stored value, returning the mismatch count.
    /// Mismatches are logged by the caller, not treated as fatal.
    pub fn validate_witnesses<F: Fn(&[(String, u64, [u64; 7])]) -> f64>(
        &self,
        recompute_fn: F,
    ) -> usize {
        self.order
            .iter()
            .filter_map(|e| e.witness.as_ref())
            .filter(|(rows, expected)| {
                (recompute_fn(rows) - *expected).abs() > f64::EPSILON
        })
            .count()
    }

    /// Number of entries currently carrying a sampled witness. Lets a
    /// caller of [`Cache::validate_witnesses`] distinguish "zero mismatches
    /// because nothing was sampled" from "zero mismatches across N checked
    /// witnesses".
    #[must_use]
    pub fn witness_count(&self) -> usize {
        self.order.iter().filter(|e| e.witness.is_some()).count()
    }

    /// Clears all entries and increments the invalidation counter. `reason`
    /// is accepted for symmetry with the telemetry call site but the cache
    /// itself does not retain it.
    pub fn invalidate(&mut self, _reason: &str) {
        self.order.clear();
        self.stats.invalidations += 1;
        self.stats.size = 0;
    }

    /// Returns the current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.order.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, Role, WealthTraits};

    fn agent(id: &str, role: Role) -> Agent {
        Agent::new(id.to_string(), 1, role, 100, WealthTraits::default()).unwrap()
    }

    #[test]
    fn canonical_key_is_order_invariant() {
        let cfg = Config::default();
        let a = agent("K-01", Role::King);
        let b = agent("N-01", Role::Knight);
        let forward = Cache::canonical_key(&[&a, &b], &cfg);
        let reversed = Cache::canonical_key(&[&b, &a], &cfg);
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 16);
    }

    #[test]
    fn canonical_key_changes_with_agent_state() {
        let cfg = Config::default();
        let a = agent("K-01", Role::King);
        let mut b = agent("K-01", Role::King);
        b.currency = 999;
        assert_ne!(
            Cache::canonical_key(&[&a], &cfg),
            Cache::canonical_key(&[&b], &cfg)
        );
    }

    #[test]
    fn get_or_compute_hits_on_second_call() {
        let cfg = Config::default();
        let mut cache = Cache::new(&cfg);
        let mut calls = 0;
        let key = "k1";
        cache.get_or_compute(key, || {
                calls += 1;
                42.0
        });
        let v = cache.get_or_compute(key, || {
                calls += 1;
                42.0
        });
        assert_eq!(v, 42.0);
        assert_eq!(calls, 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn evicts_lru_over_max_size() {
        let mut cfg = Config::default();
        cfg.cache.max_size = 2;
        let mut cache = Cache::new(&cfg);
        cache.get_or_compute("a", || 1.0);
        cache.get_or_compute("b", || 2.0);
        cache.get_or_compute("c", || 3.0);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn invalidate_clears_entries_and_counts() {
        let cfg = Config::default();
        let mut cache = Cache::new(&cfg);
        cache.get_or_compute("a", || 1.0);
        cache.invalidate("config changed");
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn witness_validation_detects_mismatch() {
        let mut cfg = Config::default();
        cfg.cache.witness_sample_rate = 1.0;
        let mut cache = Cache::new(&cfg);
        let a = agent("K-01", Role::King);
        let key = Cache::canonical_key(&[&a], &cfg);
        cache.get_or_compute(&key, || 7.0);
        cache.maybe_witness(&key, &[&a], 7.0, 0.0);
        let mismatches = cache.validate_witnesses(|_rows| 999.0);
        assert_eq!(mismatches, 1);
        let matches = cache.validate_witnesses(|_rows| 7.0);
        assert_eq!(matches, 0);
    }
}
