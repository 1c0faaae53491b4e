//! Event aggregation: per-tick counts, flows, and distributional metrics.

use std::collections::BTreeMap;

use crate::models::{AgentSnapshot, Event, EventKind, TickMetrics};

/// Collects events during a tick and reduces them (with before/after agent
/// snapshots) into [`TickMetrics`]. Stateless across ticks: construct a
/// fresh `Aggregator` per tick.
#[derive(Debug, Default)]
pub struct Aggregator {
    events: Vec<Event>,
}

impl Aggregator {
    /// Builds an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event for this tick.
    pub fn add_event(&mut self, e: Event) {
        self.events.push(e);
    }

    /// Computes the full metrics set for this tick, given the agent
    /// snapshots taken after all phases ran.
    #[must_use]
    pub fn tick_summary(&self, snapshots: &[AgentSnapshot]) -> TickMetrics {
        let bribes_accepted = count(&self.events, EventKind::BribeAccept);
        let raids_attempted = count(&self.events, EventKind::BribeAccept)
        + count(&self.events, EventKind::BribeInsufficientFunds)
        + count(&self.events, EventKind::UnopposedRaid)
        + count(&self.events, EventKind::DefendWin)
        + count(&self.events, EventKind::DefendLoss);
        let raids_won_by_knight = count(&self.events, EventKind::DefendWin);
        let raids_won_by_merc = count(&self.events, EventKind::DefendLoss)
        + count(&self.events, EventKind::UnopposedRaid);

        let wealth_total: u64 = snapshots.iter().map(|s| s.wealth_total).sum();
        let currency_total: u64 = snapshots.iter().map(|s| s.currency).sum();
        let copy_score_mean = if snapshots.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let sum: f64 = snapshots.iter().map(|s| s.wealth.copy as f64).sum();
            sum / snapshots.len() as f64
        };

        TickMetrics {
            entropy: wealth_entropy(snapshots),
            compression_ratio: 0.0,
            copy_score_mean,
            wealth_total,
            currency_total,
            bribes_paid: bribes_accepted,
            bribes_accepted,
            raids_attempted,
            raids_won_by_merc,
            raids_won_by_knight,
        }
    }

    /// Net currency gained (positive) or lost (negative) by each role this
    /// tick, derived from event amounts and known transfer semantics.
    /// Bribes and stake/bounty transfers move currency from King to
    /// Mercenary or Mercenary to Knight; trade and retainer events move
    /// currency out of a King.
    #[must_use]
    pub fn currency_flows_by_role(&self) -> BTreeMap<&'static str, i64> {
        let mut flows: BTreeMap<&'static str, i64> = BTreeMap::new();
        for e in &self.events {
            match e.kind {
                EventKind::BribeAccept => {
                    let amount = i64::try_from(e.amount.unwrap_or(0)).unwrap_or(i64::MAX);
                    *flows.entry("King").or_default() -= amount;
                    *flows.entry("Mercenary").or_default() += amount;
                }
                EventKind::Trade => {
                    let amount = i64::try_from(e.amount.unwrap_or(0)).unwrap_or(i64::MAX);
                    *flows.entry("King").or_default() -= amount;
                }
                EventKind::Retainer => {
                    let amount = i64::try_from(e.amount.unwrap_or(0)).unwrap_or(i64::MAX);
                    *flows.entry("King").or_default() -= amount;
                    *flows.entry("Knight").or_default() += amount;
                }
                EventKind::DefendWin => {
                    let stake = i64::try_from(e.stake.unwrap_or(0)).unwrap_or(i64::MAX);
                    *flows.entry("Mercenary").or_default() -= stake;
                    *flows.entry("Knight").or_default() += stake;
                }
                EventKind::DefendLoss | EventKind::UnopposedRaid => {
                    let amount = i64::try_from(e.amount.unwrap_or(0)).unwrap_or(i64::MAX);
                    *flows.entry("King").or_default() -= amount;
                    *flows.entry("Mercenary").or_default() += amount;
                }
                EventKind::BribeInsufficientFunds | EventKind::TraitDrip | EventKind::RoleMutated => {}
            }
        }
        flows
    }

    /// Per-trait wealth delta by role, comparing `before` and `after`
    /// snapshots keyed by agent id.
    #[must_use]
    pub fn wealth_changes_by_role(
        before: &[AgentSnapshot],
        after: &[AgentSnapshot],
    ) -> BTreeMap<(crate::models::Role, &'static str), i64> {
        let before_by_id: BTreeMap<&str, &AgentSnapshot> =
        before.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut out = BTreeMap::new();
        for snap in after {
            let Some(prior) = before_by_id.get(snap.id.as_str()) else {
                continue;
            };
            for name in crate::models::TRAIT_NAMES {
                let before_v = prior.wealth.get(name).unwrap_or(0) as i64;
                let after_v = snap.wealth.get(name).unwrap_or(0) as i64;
                *out.entry((snap.role, name)).or_default() += after_v - before_v;
            }
        }
        out
    }
}

fn count(events: &[Event], kind: EventKind) -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let n = events.iter().filter(|e| e.kind == kind).count() as u64;
    n
}

/// Gini coefficient over `values`: `G = Σ|x_i − x_j| / (2n·Σx_i)`.
/// Returns 0 when fewer than two agents or all wealth is zero.
#[must_use]
pub fn gini(values: &[u64]) -> f64 {
    let n = values.len();
    #[allow(clippy::cast_precision_loss)]
    let total: f64 = values.iter().sum::<u64>() as f64;
    if n < 2 || total == 0.0 {
        return 0.0;
    }
    let mut abs_diff_sum = 0.0;
    #[allow(clippy::cast_precision_loss)]
    for &xi in values {
        for &xj in values {
            abs_diff_sum += (xi as f64 - xj as f64).abs();
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n_f = n as f64;
    abs_diff_sum / (2.0 * n_f * total)
}

/// Shannon entropy, in bits, of the normalized total-wealth distribution
/// over `snapshots`. Returns 0 when total wealth is zero.
#[must_use]
pub fn wealth_entropy(snapshots: &[AgentSnapshot]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let total: f64 = snapshots.iter().map(|s| s.wealth_total as f64).sum();
    if total <= 0.0 {
        return 0.0;
    }
    snapshots
        .iter()
        .filter(|s| s.wealth_total > 0)
        .map(|s| {
            #[allow(clippy::cast_precision_loss)]
            let p = s.wealth_total as f64 / total;
            -p * p.log2()
    })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, WealthTraits};

    fn snapshot(id: &str, role: Role, wealth_total: u64, copy: u64) -> AgentSnapshot {
        AgentSnapshot {
            id: id.to_string(),
            role,
            currency: 0,
            wealth_total,
            wealth: WealthTraits {
                copy,
                ..Default::default()
            },
            employer: None,
            retainer_fee: 0,
            bribe_threshold: 0,
            alive: true,
        }
    }

    #[test]
    fn gini_is_zero_for_equal_wealth() {
        assert!((gini(&[10, 10, 10]) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn gini_is_positive_under_inequality() {
        let g = gini(&[0, 0, 100]);
        assert!(g > 0.0);
    }

    #[test]
    fn entropy_is_zero_for_single_agent() {
        let snaps = vec![snapshot("K-01", Role::King, 100, 0)];
        assert!((wealth_entropy(&snaps) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn entropy_is_positive_for_split_wealth() {
        let snaps = vec![
            snapshot("K-01", Role::King, 50, 0),
            snapshot("N-01", Role::Knight, 50, 0),
        ];
        assert!((wealth_entropy(&snaps) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tick_summary_counts_bribe_events() {
        let mut agg = Aggregator::new();
        let mut e = Event::new(0, EventKind::BribeAccept);
        e.amount = Some(350);
        agg.add_event(e);
        let snaps = vec![snapshot("K-01", Role::King, 100, 12)];
        let metrics = agg.tick_summary(&snaps);
        assert_eq!(metrics.bribes_accepted, 1);
        assert_eq!(metrics.raids_attempted, 1);
        assert!((metrics.copy_score_mean - 12.0).abs() < 1e-9);
    }

    #[test]
    fn currency_flows_balance_for_bribe() {
        let mut agg = Aggregator::new();
        let mut e = Event::new(0, EventKind::BribeAccept);
        e.amount = Some(350);
        agg.add_event(e);
        let flows = agg.currency_flows_by_role();
        assert_eq!(flows["King"], -350);
        assert_eq!(flows["Mercenary"], 350);
    }
}
