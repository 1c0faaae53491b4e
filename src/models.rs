//! Core data model: agents, wealth traits, events, and per-tick results.

use std::collections::BTreeMap;

use crate::error::ModelError;

/// Economic role an agent plays. Determines id prefix, eligible fields, and
/// which phases of the tick engine visit the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Raid target; pays retainers to Knights and may bribe Mercenaries.
    King,
    /// Employed defender; collects a retainer, fights raids on behalf of a King.
    Knight,
    /// Free agent; raids Kings for bribes or contested plunder.
    Mercenary,
}

impl Role {
    /// Returns the id prefix for this role (`K-`, `N-`, `M-`).
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::King => "K-",
            Self::Knight => "N-",
            Self::Mercenary => "M-",
        }
    }
}

/// The seven wealth traits tracked per agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WealthTraits {
    /// Computational capacity trait.
    pub compute: u64,
    /// Self-replication fidelity trait.
    pub copy: u64,
    /// Defensive capability trait.
    pub defend: u64,
    /// Raid capability trait.
    pub raid: u64,
    /// Trade capacity trait.
    pub trade: u64,
    /// Sensing capability trait.
    pub sense: u64,
    /// Adaptive capability trait.
    pub adapt: u64,
}

/// Names of the seven traits, in the fixed order used for iteration and
/// canonical serialization.
pub const TRAIT_NAMES: [&str; 7] = [
    "compute", "copy", "defend", "raid", "trade", "sense", "adapt",
];

impl WealthTraits {
    /// Constructs a trait set, failing if any field is supplied negative
    /// (callers build from non-negative integers; this exists for the rare
    /// path where a trait is derived from a signed computation).
    pub fn try_new(values: [i64; 7]) -> Result<Self, ModelError> {
        for (name, v) in TRAIT_NAMES.iter().zip(values.iter()) {
            if *v < 0 {
                return Err(ModelError::InvalidModel {
                        field: name,
                        value: *v,
                });
            }
        }
        Ok(Self {
                compute: values[0] as u64,
                copy: values[1] as u64,
                defend: values[2] as u64,
                raid: values[3] as u64,
                trade: values[4] as u64,
                sense: values[5] as u64,
                adapt: values[6] as u64,
        })
    }

    /// Sum of all seven traits (`wealth_total`).
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.compute + self.copy + self.defend + self.raid + self.trade + self.sense + self.adapt
    }

    /// Scales every trait by `factor`, flooring each product. Trait values
    /// are integers; fraction applications always floor.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        let f = |v: u64| -> u64 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = (v as f64 * factor).floor();
            if scaled <= 0.0 {
                0
            } else {
                scaled as u64
            }
        };
        Self {
            compute: f(self.compute),
            copy: f(self.copy),
            defend: f(self.defend),
            raid: f(self.raid),
            trade: f(self.trade),
            sense: f(self.sense),
            adapt: f(self.adapt),
        }
    }

    /// Adds `delta` to the named trait, saturating at zero on negative
    /// deltas that would otherwise underflow.
    pub fn add(&mut self, trait_name: &str, delta: i64) {
        let field = match trait_name {
            "compute" => &mut self.compute,
            "copy" => &mut self.copy,
            "defend" => &mut self.defend,
            "raid" => &mut self.raid,
            "trade" => &mut self.trade,
            "sense" => &mut self.sense,
            "adapt" => &mut self.adapt,
            _ => return,
        };
        *field = saturating_add_i64(*field, delta);
    }

    /// Reads the named trait by string (used by the policy compiler's
    /// attribute-path evaluation).
    #[must_use]
    pub fn get(&self, trait_name: &str) -> Option<u64> {
        match trait_name {
            "compute" => Some(self.compute),
            "copy" => Some(self.copy),
            "defend" => Some(self.defend),
            "raid" => Some(self.raid),
            "trade" => Some(self.trade),
            "sense" => Some(self.sense),
            "adapt" => Some(self.adapt),
            _ => None,
        }
    }
}

/// Saturates a `u64` counter at zero when applying a signed delta. Clamps
/// only the edge case; never masks a real conservation bug.
#[must_use]
pub fn saturating_add_i64(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}

/// A persistent economic agent bound to one BFF tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Unique id, prefixed by role (`K-01`, `N-03`, `M-12`,...).
    pub id: String,
    /// The tape this agent is bound to.
    pub tape_id: u64,
    /// Economic role.
    pub role: Role,
    /// Non-negative currency balance.
    pub currency: u64,
    /// The seven non-negative wealth traits.
    pub wealth: WealthTraits,
    /// King id this Knight is employed by, if any. Only meaningful for
    /// `Role::Knight`.
    pub employer: Option<String>,
    /// Per-tick retainer fee owed by the employer. Zero for non-Knights.
    pub retainer_fee: u64,
    /// Maximum bribe a King will pay. Zero for non-Kings.
    pub bribe_threshold: u64,
    /// Whether this agent is still active in the simulation.
    pub alive: bool,
}

impl Agent {
    /// Constructs a new agent, validating non-negativity and that `id`
    /// carries the id prefix for `role`.
    pub fn new(
        id: String,
        tape_id: u64,
        role: Role,
        currency: u64,
        wealth: WealthTraits,
    ) -> Result<Self, ModelError> {
        if !id.starts_with(role.id_prefix()) {
            return Err(ModelError::RolePrefixMismatch { id, role });
        }
        Ok(Self {
                id,
                tape_id,
                role,
                currency,
                wealth,
                employer: None,
                retainer_fee: 0,
                bribe_threshold: 0,
                alive: true,
        })
    }

    /// Applies a signed currency delta, saturating at zero. Callers
    /// performing a conserved transfer must compute the exact delta that
    /// fits on both sides; this only clamps the rare rounding-into-zero
    /// edge case, it does not silently repair a conservation failure.
    pub fn add_currency(&mut self, delta: i64) {
        self.currency = saturating_add_i64(self.currency, delta);
    }

    /// Total wealth across all seven traits (`wealth_total`).
    #[must_use]
    pub fn wealth_total(&self) -> u64 {
        self.wealth.total()
    }
}

/// Closed set of event kinds the tick engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// Soup-drip trait growth (Phase 1).
    TraitDrip,
    /// King investment into wealth via trade (Phase 2).
    Trade,
    /// King-to-Knight retainer payment (Phase 3).
    Retainer,
    /// A King accepted a Mercenary's raid-averting bribe.
    BribeAccept,
    /// A King's threshold covered the raid value but funds were insufficient.
    BribeInsufficientFunds,
    /// A defending Knight won a contest.
    DefendWin,
    /// A defending Knight lost a contest.
    DefendLoss,
    /// A Mercenary raided an undefended King.
    UnopposedRaid,
    /// An agent's role was reassigned by `Registry::mutate_roles`. Emitted
    /// only when `roles.mutation_events` is enabled.
    RoleMutated,
}

/// An immutable record of one action taken during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Tick during which this event occurred.
    pub tick: u64,
    /// The kind of event.
    pub kind: EventKind,
    /// King agent id, when applicable.
    pub king: Option<String>,
    /// Knight agent id, when applicable.
    pub knight: Option<String>,
    /// Mercenary agent id, when applicable.
    pub merc: Option<String>,
    /// Currency amount moved, when applicable.
    pub amount: Option<u64>,
    /// Currency staked in a defend contest, when applicable.
    pub stake: Option<u64>,
    /// Knight win probability used to resolve a defend contest, when applicable.
    pub probability: Option<f64>,
    /// Free-form diagnostic text (never parsed by this crate, only surfaced).
    pub notes: Option<String>,
}

impl Event {
    /// Constructs an event with only the fields relevant to its kind set;
    /// all optional fields default to `None`.
    #[must_use]
    pub fn new(tick: u64, kind: EventKind) -> Self {
        Self {
            tick,
            kind,
            king: None,
            knight: None,
            merc: None,
            amount: None,
            stake: None,
            probability: None,
            notes: None,
        }
    }
}

/// Immutable copy of an agent at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    /// Agent id.
    pub id: String,
    /// Economic role.
    pub role: Role,
    /// Currency balance at snapshot time.
    pub currency: u64,
    /// Total wealth at snapshot time (sum of all seven traits).
    pub wealth_total: u64,
    /// The seven wealth traits at snapshot time.
    pub wealth: WealthTraits,
    /// Employer id, if any.
    pub employer: Option<String>,
    /// Retainer fee at snapshot time.
    pub retainer_fee: u64,
    /// Bribe threshold at snapshot time.
    pub bribe_threshold: u64,
    /// Whether the agent was alive at snapshot time.
    pub alive: bool,
}

impl From<&Agent> for AgentSnapshot {
    fn from(a: &Agent) -> Self {
        Self {
            id: a.id.clone(),
            role: a.role,
            currency: a.currency,
            wealth_total: a.wealth_total(),
            wealth: a.wealth,
            employer: a.employer.clone(),
            retainer_fee: a.retainer_fee,
            bribe_threshold: a.bribe_threshold,
            alive: a.alive,
        }
    }
}

/// Scalar counters summarizing one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickMetrics {
    /// Shannon entropy, in bits, of the normalized total-wealth distribution.
    pub entropy: f64,
    /// Placeholder compression-ratio proxy.
    pub compression_ratio: f64,
    /// Mean `copy` trait across all agents.
    pub copy_score_mean: f64,
    /// Sum of `wealth_total()` across all agents.
    pub wealth_total: u64,
    /// Sum of `currency` across all agents.
    pub currency_total: u64,
    /// Count of bribes paid (accepted).
    pub bribes_paid: u64,
    /// Count of bribes accepted (tracked separately from `bribes_paid`).
    pub bribes_accepted: u64,
    /// Count of raids attempted (bribe path + contest path).
    pub raids_attempted: u64,
    /// Count of raids won by the attacking Mercenary.
    pub raids_won_by_merc: u64,
    /// Count of raids won (defended) by a Knight.
    pub raids_won_by_knight: u64,
}

/// The full result of advancing one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    /// The tick that was processed.
    pub tick: u64,
    /// Events emitted during the tick, in deterministic emission order.
    pub events: Vec<Event>,
    /// Scalar metrics computed over the tick.
    pub metrics: TickMetrics,
    /// End-of-tick snapshots of every agent, sorted by id.
    pub snapshots: Vec<AgentSnapshot>,
}

/// One epoch of input from the external trace adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochData {
    /// Monotonic epoch counter from the trace source.
    pub epoch_num: u64,
    /// Tape id to 64-byte tape contents. Read-only; never mutated by the engine.
    pub tapes: BTreeMap<u64, [u8; 64]>,
    /// Observed tape-to-tape interactions this epoch.
    pub interactions: Vec<(u64, u64)>,
    /// Soup-derived scalar metrics (e.g. a copy-trait signal).
    pub metrics: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wealth_total_sums_all_traits() {
        let w = WealthTraits {
            compute: 1,
            copy: 2,
            defend: 3,
            raid: 4,
            trade: 5,
            sense: 6,
            adapt: 7,
        };
        assert_eq!(w.total(), 28);
    }

    #[test]
    fn scale_floors_per_trait() {
        let w = WealthTraits {
            compute: 10,
            copy: 0,
            defend: 3,
            raid: 0,
            trade: 0,
            sense: 0,
            adapt: 0,
        };
        let scaled = w.scale(0.95);
        assert_eq!(scaled.compute, 9); // floor(9.5)
        assert_eq!(scaled.defend, 2); // floor(2.85)
    }

    #[test]
    fn add_saturates_at_zero() {
        let mut w = WealthTraits::default();
        w.add("defend", -5);
        assert_eq!(w.defend, 0);
        w.add("defend", 10);
        w.add("defend", -3);
        assert_eq!(w.defend, 7);
    }

    #[test]
    fn agent_new_rejects_role_prefix_mismatch() {
        let err = Agent::new(
            "N-01".to_string(),
            1,
            Role::King,
            100,
            WealthTraits::default(),
        )
            .unwrap_err();
        assert!(matches!(err, ModelError::RolePrefixMismatch {.. }));
    }

    #[test]
    fn add_currency_saturates() {
        let mut a = Agent::new(
            "K-01".to_string(),
            1,
            Role::King,
            10,
            WealthTraits::default(),
        )
            .unwrap();
        a.add_currency(-100);
        assert_eq!(a.currency, 0);
    }
}
