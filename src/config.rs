//! Typed configuration tree and deterministic content hashing.

use std::collections::BTreeMap;

use blake3::Hasher;

use crate::error::ConfigError;
use crate::policy::{CompiledPolicies, PolicySources};

/// `roles.ratios` / `roles.initial_currency` / `roles.initial_wealth`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleRatios {
    /// Target fraction of agents assigned the King role.
    pub king: f64,
    /// Target fraction of agents assigned the Knight role.
    pub knight: f64,
    /// Target fraction of agents assigned the Mercenary role.
    pub mercenary: f64,
}

impl Default for RoleRatios {
    fn default() -> Self {
        Self {
            king: 0.10,
            knight: 0.20,
            mercenary: 0.70,
        }
    }
}

/// An inclusive `[lo, hi]` integer range used for uniform sampling at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    /// Inclusive lower bound.
    pub lo: i64,
    /// Inclusive upper bound.
    pub hi: i64,
}

impl Range {
    /// Constructs a new range.
    #[must_use]
    pub const fn new(lo: i64, hi: i64) -> Self {
        Self { lo, hi }
    }
}

/// Per-role initial currency/wealth ranges and role proportions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RolesConfig {
    /// Role assignment ratios.
    pub ratios: RoleRatios,
    /// Per-tick probability of a role reassignment (default disabled).
    pub mutation_rate: f64,
    /// Whether `mutate_roles` emits an explicit event; default `false`,
    /// keeping role mutation silent unless a caller opts in.
    pub mutation_events: bool,
    /// Initial currency range per role.
    pub initial_currency: RoleMap<Range>,
    /// Initial wealth-per-trait range per role.
    pub initial_wealth: RoleMap<Range>,
    /// Knight retainer-fee sampling range.
    pub retainer_fee_range: Range,
    /// King bribe-threshold sampling range.
    pub bribe_threshold_range: Range,
}

/// A value keyed by the three roles, used for per-role config tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleMap<T> {
    /// Value for the King role.
    pub king: T,
    /// Value for the Knight role.
    pub knight: T,
    /// Value for the Mercenary role.
    pub mercenary: T,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            ratios: RoleRatios::default(),
            mutation_rate: 0.0,
            mutation_events: false,
            initial_currency: RoleMap {
                king: Range::new(5000, 7000),
                knight: Range::new(100, 300),
                mercenary: Range::new(0, 50),
            },
            initial_wealth: RoleMap {
                king: Range::new(10, 30),
                knight: Range::new(5, 15),
                mercenary: Range::new(0, 10),
            },
            retainer_fee_range: Range::new(20, 30),
            bribe_threshold_range: Range::new(300, 500),
        }
    }
}

/// Raid-value weighting coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RaidValueWeights {
    /// Weight on the Mercenary's own raid trait.
    pub alpha_raid: f64,
    /// Weight on the Mercenary's sense+adapt traits.
    pub beta_sense_adapt: f64,
    /// Weight (negative contribution) of the King's defend projection.
    pub gamma_king_defend: f64,
    /// Weight on the King's exposed wealth.
    pub delta_king_exposed: f64,
}

impl Default for RaidValueWeights {
    fn default() -> Self {
        Self {
            alpha_raid: 1.0,
            beta_sense_adapt: 0.25,
            gamma_king_defend: 0.60,
            delta_king_exposed: 0.40,
        }
    }
}

/// Defend-contest resolution parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefendResolution {
    /// Base knight win rate before trait-delta and employment adjustments.
    pub base_knight_winrate: f64,
    /// Weight applied to `trait_delta` inside the sigmoid.
    pub trait_advantage_weight: f64,
    /// Lower clamp bound for `p_knight_win`.
    pub clamp_min: f64,
    /// Upper clamp bound for `p_knight_win`.
    pub clamp_max: f64,
    /// Fraction of combined currency staked in a contest.
    pub stake_currency_frac: f64,
    /// Fraction of raid/adapt wealth paid as bounty to the winning Knight.
    pub bounty_wealth_frac: f64,
    /// Additive win-probability bonus when the Knight is employed by the
    /// King under raid.
    pub employment_bonus: f64,
}

impl Default for DefendResolution {
    fn default() -> Self {
        Self {
            base_knight_winrate: 0.50,
            trait_advantage_weight: 0.30,
            clamp_min: 0.05,
            clamp_max: 0.95,
            stake_currency_frac: 0.10,
            bounty_wealth_frac: 0.07,
            employment_bonus: 0.08,
        }
    }
}

/// Trade-phase parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeConfig {
    /// Currency a King must hold (and spends) to trade this tick.
    pub invest_per_tick: u64,
    /// Wealth units nominally created per trade (diagnostic only; the actual
    /// distribution is `distribution`).
    pub created_wealth_units: u64,
    /// Per-trait wealth gained from one trade.
    pub distribution_defend: u64,
    /// Per-trait wealth gained from one trade.
    pub distribution_trade: u64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            invest_per_tick: 100,
            created_wealth_units: 5,
            distribution_defend: 3,
            distribution_trade: 2,
        }
    }
}

/// Mirrored-loss parameters applied on a failed bribe / lost defense.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnFailedBribe {
    /// Fraction of the King's currency transferred to the Mercenary.
    pub king_currency_loss_frac: f64,
    /// Fraction of each King wealth trait transferred to the Mercenary.
    pub king_wealth_loss_frac: f64,
}

impl Default for OnFailedBribe {
    fn default() -> Self {
        Self {
            king_currency_loss_frac: 0.50,
            king_wealth_loss_frac: 0.25,
        }
    }
}

/// Economic formula parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EconomicConfig {
    /// `[currency_units, wealth_units]` conversion ratio for trades.
    pub currency_to_wealth_ratio: (u64, u64),
    /// Fraction of a King's wealth lost to leakage on an accepted bribe.
    pub bribe_leakage: f64,
    /// Role-indexed exposure factors for `wealth_exposed`.
    pub exposure_factors: RoleMap<f64>,
    /// Raid-value weighting coefficients.
    pub raid_value_weights: RaidValueWeights,
    /// Defend-contest resolution parameters.
    pub defend_resolution: DefendResolution,
    /// Trade-phase parameters.
    pub trade: TradeConfig,
    /// Mirrored-loss parameters on a failed bribe / lost defense.
    pub on_failed_bribe: OnFailedBribe,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        Self {
            currency_to_wealth_ratio: (100, 5),
            bribe_leakage: 0.05,
            exposure_factors: RoleMap {
                king: 1.0,
                knight: 0.5,
                mercenary: 0.4,
            },
            raid_value_weights: RaidValueWeights::default(),
            defend_resolution: DefendResolution::default(),
            trade: TradeConfig::default(),
            on_failed_bribe: OnFailedBribe::default(),
        }
    }
}

/// Per-channel refractory windows, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefractoryConfig {
    /// Raid channel window.
    pub raid: u64,
    /// Defend channel window.
    pub defend: u64,
    /// Bribe channel window.
    pub bribe: u64,
    /// Trade channel window.
    pub trade: u64,
    /// Retainer channel window.
    pub retainer: u64,
}

impl Default for RefractoryConfig {
    fn default() -> Self {
        Self {
            raid: 2,
            defend: 1,
            bribe: 1,
            trade: 0,
            retainer: 0,
        }
    }
}

/// Cache sizing and witness-sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    /// Whether the cache is consulted at all.
    pub enabled: bool,
    /// Maximum number of entries before LRU eviction.
    pub max_size: usize,
    /// Probability that a computed value is also stored as a witness sample.
    pub witness_sample_rate: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10_000,
            witness_sample_rate: 0.05,
        }
    }
}

/// One trait-emergence rule: a DSL condition and the trait deltas it grants
/// when true.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraitEmergenceRule {
    /// Boolean DSL expression over agent fields and `tick`.
    pub condition: String,
    /// Trait name to integer delta, applied when `condition` evaluates true.
    pub delta: BTreeMap<String, i64>,
}

/// Trait-emergence ("soup drip") configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraitEmergenceConfig {
    /// Whether Phase 1 runs at all.
    pub enabled: bool,
    /// Ordered list of rules evaluated per agent per tick.
    pub rules: Vec<TraitEmergenceRule>,
}

impl Default for TraitEmergenceConfig {
    fn default() -> Self {
        let mut delta = BTreeMap::new();
        delta.insert("copy".to_string(), 1);
        Self {
            enabled: true,
            rules: vec![TraitEmergenceRule {
                    condition: "copy >= 12 and tick % 2 == 0".to_string(),
                    delta,
            }],
        }
    }
}

/// Top-level configuration tree. Constructed via [`Config::default`]
/// or deserialized (behind the `serde` feature) and always passed through
/// [`Config::validate`] before use.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Config schema version.
    pub version: String,
    /// Seed controlling all sampling at initialization.
    pub seed: u64,
    /// Role assignment and initialization parameters.
    pub roles: RolesConfig,
    /// Economic formula parameters.
    pub economic: EconomicConfig,
    /// Per-channel refractory windows.
    pub refractory: RefractoryConfig,
    /// Cache sizing and witness sampling.
    pub cache: CacheConfig,
    /// Trait-emergence rules.
    pub trait_emergence: TraitEmergenceConfig,
    /// Policy DSL source overrides for the four compiled policy slots.
    pub policy: PolicySources,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "0.1.1".to_string(),
            seed: 0,
            roles: RolesConfig::default(),
            economic: EconomicConfig::default(),
            refractory: RefractoryConfig::default(),
            cache: CacheConfig::default(),
            trait_emergence: TraitEmergenceConfig::default(),
            policy: PolicySources::default(),
        }
    }
}

const RATIO_TOLERANCE: f64 = 1e-6;

impl Config {
    /// Validates role ratios, probability bounds, and non-negative
    /// fractions, collecting every failure rather than stopping at the
    /// first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let ratio_sum =
        self.roles.ratios.king + self.roles.ratios.knight + self.roles.ratios.mercenary;
        if (ratio_sum - 1.0).abs() > RATIO_TOLERANCE {
            errors.push(format!(
                    "roles.ratios must sum to 1.0 (±{RATIO_TOLERANCE}), got {ratio_sum}"
            ));
        }

        for (name, p) in [
            ("roles.mutation_rate", self.roles.mutation_rate),
            (
                "economic.bribe_leakage",
                self.economic.bribe_leakage,
            ),
            (
                "economic.defend_resolution.base_knight_winrate",
                self.economic.defend_resolution.base_knight_winrate,
            ),
            (
                "economic.defend_resolution.clamp_min",
                self.economic.defend_resolution.clamp_min,
            ),
            (
                "economic.defend_resolution.clamp_max",
                self.economic.defend_resolution.clamp_max,
            ),
            (
                "economic.on_failed_bribe.king_currency_loss_frac",
                self.economic.on_failed_bribe.king_currency_loss_frac,
            ),
            (
                "economic.on_failed_bribe.king_wealth_loss_frac",
                self.economic.on_failed_bribe.king_wealth_loss_frac,
            ),
            (
                "economic.defend_resolution.stake_currency_frac",
                self.economic.defend_resolution.stake_currency_frac,
            ),
            (
                "economic.defend_resolution.bounty_wealth_frac",
                self.economic.defend_resolution.bounty_wealth_frac,
            ),
            ("cache.witness_sample_rate", self.cache.witness_sample_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                errors.push(format!("{name} must be in [0, 1], got {p}"));
            }
        }

        if self.economic.defend_resolution.clamp_min > self.economic.defend_resolution.clamp_max {
            errors.push(format!(
                    "economic.defend_resolution.clamp_min ({}) must be <= clamp_max ({})",
                    self.economic.defend_resolution.clamp_min,
                    self.economic.defend_resolution.clamp_max
            ));
        }

        for (name, w) in [
            (
                "economic.raid_value_weights.alpha_raid",
                self.economic.raid_value_weights.alpha_raid,
            ),
            (
                "economic.raid_value_weights.beta_sense_adapt",
                self.economic.raid_value_weights.beta_sense_adapt,
            ),
            (
                "economic.raid_value_weights.gamma_king_defend",
                self.economic.raid_value_weights.gamma_king_defend,
            ),
            (
                "economic.raid_value_weights.delta_king_exposed",
                self.economic.raid_value_weights.delta_king_exposed,
            ),
        ] {
            if w < 0.0 {
                errors.push(format!("{name} must be >= 0, got {w}"));
            }
        }

        errors.extend(CompiledPolicies::validate(&self.policy));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { errors })
        }
    }

    /// Compiles this config's policy sources, failing on the first error.
    /// Prefer [`Config::validate`] when you need every error at
    /// once, e.g. at load time before the engine starts.
    ///
    /// # Errors
    /// Returns the underlying [`crate::error::PolicyError`].
    pub fn compile_policies(&self) -> Result<CompiledPolicies, crate::error::PolicyError> {
        CompiledPolicies::compile(&self.policy)
    }

    /// Computes the 16-hex-character content hash used in cache keys and
    /// output metadata. Hashed over a fixed, canonical field order so
    /// the result does not depend on how the config was constructed.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let mut hasher = Hasher::new();
        hasher.update(b"mince-config-v1:");
        hasher.update(self.version.as_bytes());
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(&self.roles.ratios.king.to_le_bytes());
        hasher.update(&self.roles.ratios.knight.to_le_bytes());
        hasher.update(&self.roles.ratios.mercenary.to_le_bytes());
        hasher.update(&self.roles.mutation_rate.to_le_bytes());
        hasher.update(&[u8::from(self.roles.mutation_events)]);
        hash_range(&mut hasher, self.roles.initial_currency.king);
        hash_range(&mut hasher, self.roles.initial_currency.knight);
        hash_range(&mut hasher, self.roles.initial_currency.mercenary);
        hash_range(&mut hasher, self.roles.initial_wealth.king);
        hash_range(&mut hasher, self.roles.initial_wealth.knight);
        hash_range(&mut hasher, self.roles.initial_wealth.mercenary);
        hash_range(&mut hasher, self.roles.retainer_fee_range);
        hash_range(&mut hasher, self.roles.bribe_threshold_range);
        hasher.update(&self.economic.currency_to_wealth_ratio.0.to_le_bytes());
        hasher.update(&self.economic.currency_to_wealth_ratio.1.to_le_bytes());
        hasher.update(&self.economic.bribe_leakage.to_le_bytes());
        hasher.update(&self.economic.exposure_factors.king.to_le_bytes());
        hasher.update(&self.economic.exposure_factors.knight.to_le_bytes());
        hasher.update(&self.economic.exposure_factors.mercenary.to_le_bytes());
        hasher.update(&self.economic.raid_value_weights.alpha_raid.to_le_bytes());
        hasher.update(
            &self
                .economic
                .raid_value_weights
                .beta_sense_adapt
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .raid_value_weights
                .gamma_king_defend
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .raid_value_weights
                .delta_king_exposed
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .defend_resolution
                .base_knight_winrate
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .defend_resolution
                .trait_advantage_weight
                .to_le_bytes(),
        );
        hasher.update(&self.economic.defend_resolution.clamp_min.to_le_bytes());
        hasher.update(&self.economic.defend_resolution.clamp_max.to_le_bytes());
        hasher.update(
            &self
                .economic
                .defend_resolution
                .stake_currency_frac
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .defend_resolution
                .bounty_wealth_frac
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .defend_resolution
                .employment_bonus
                .to_le_bytes(),
        );
        hasher.update(&self.economic.trade.invest_per_tick.to_le_bytes());
        hasher.update(&self.economic.trade.created_wealth_units.to_le_bytes());
        hasher.update(&self.economic.trade.distribution_defend.to_le_bytes());
        hasher.update(&self.economic.trade.distribution_trade.to_le_bytes());
        hasher.update(
            &self
                .economic
                .on_failed_bribe
                .king_currency_loss_frac
                .to_le_bytes(),
        );
        hasher.update(
            &self
                .economic
                .on_failed_bribe
                .king_wealth_loss_frac
                .to_le_bytes(),
        );
        hasher.update(&self.refractory.raid.to_le_bytes());
        hasher.update(&self.refractory.defend.to_le_bytes());
        hasher.update(&self.refractory.bribe.to_le_bytes());
        hasher.update(&self.refractory.trade.to_le_bytes());
        hasher.update(&self.refractory.retainer.to_le_bytes());
        hasher.update(&[u8::from(self.cache.enabled)]);
        #[allow(clippy::cast_possible_truncation)]
        hasher.update(&(self.cache.max_size as u64).to_le_bytes());
        hasher.update(&self.cache.witness_sample_rate.to_le_bytes());
        hasher.update(&[u8::from(self.trait_emergence.enabled)]);
        for rule in &self.trait_emergence.rules {
            hasher.update(rule.condition.as_bytes());
            for (k, v) in &rule.delta {
                hasher.update(k.as_bytes());
                hasher.update(&v.to_le_bytes());
            }
        }
        for slot in [
            &self.policy.raid_value,
            &self.policy.bribe_outcome,
            &self.policy.p_knight_win,
            &self.policy.trade_action,
        ] {
            hasher.update(slot.as_deref().unwrap_or("").as_bytes());
        }
        let digest = hasher.finalize();
        hex::encode(&digest.as_bytes()[..8])
    }
}

fn hash_range(hasher: &mut Hasher, r: Range) {
    hasher.update(&r.lo.to_le_bytes());
    hasher.update(&r.hi.to_le_bytes());
}
