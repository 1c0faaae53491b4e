//! Pure economic formulas and transfer appliers.
//!
//! Every function here is referentially transparent: decisions are returned
//! as values, and the transfer appliers are the only functions that mutate
//! agent state (by `&mut` reference), each preserving non-negative currency
//! and wealth.

use crate::config::Config;
use crate::models::Agent;

/// Logistic sigmoid, clamped against overflow for `|x| > 40`.
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    let x = x.clamp(-40.0, 40.0);
    1.0 / (1.0 + (-x).exp())
}

/// Clamps `v` into `[lo, hi]`.
#[must_use]
pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.clamp(lo, hi)
}

/// Sum of an agent's seven wealth traits.
#[must_use]
pub fn wealth_total(a: &Agent) -> u64 {
    a.wealth_total()
}

/// An agent's total wealth times its role-dependent exposure factor.
#[must_use]
pub fn wealth_exposed(a: &Agent, cfg: &Config) -> f64 {
    let factor = match a.role {
        crate::models::Role::King => cfg.economic.exposure_factors.king,
        crate::models::Role::Knight => cfg.economic.exposure_factors.knight,
        crate::models::Role::Mercenary => cfg.economic.exposure_factors.mercenary,
    };
    wealth_total(a) as f64 * factor
}

/// Aggregate defensive strength of `knights` against `attackers`, scaled
/// down when knights are outnumbered.
#[must_use]
pub fn king_defend_projection(knights: &[&Agent], attackers: usize) -> f64 {
    let strength: f64 = knights
        .iter()
        .map(|k| k.wealth.defend as f64 + 0.5 * k.wealth.sense as f64 + 0.5 * k.wealth.adapt as f64)
        .sum();
    let ratio = (knights.len() as f64) / (attackers.max(1) as f64);
    strength * ratio.min(1.0)
}

/// Scalar measure of how attractive `king` is as a raid target for `merc`,
/// given the knights currently defending.
#[must_use]
pub fn raid_value(merc: &Agent, king: &Agent, knights: &[&Agent], cfg: &Config) -> f64 {
    let w = &cfg.economic.raid_value_weights;
    let projection = king_defend_projection(knights, 1);
    let raw = w.alpha_raid * merc.wealth.raid as f64
    + w.beta_sense_adapt * (merc.wealth.sense as f64 + merc.wealth.adapt as f64)
    - w.gamma_king_defend * projection
    + w.delta_king_exposed * wealth_exposed(king, cfg);
    raw.max(0.0)
}

/// Knight win probability against a specific Mercenary. Always
/// within `[clamp_min, clamp_max]`.
#[must_use]
pub fn p_knight_win(knight: &Agent, merc: &Agent, king: &Agent, cfg: &Config) -> f64 {
    let d = &cfg.economic.defend_resolution;
    let trait_delta = (knight.wealth.defend as f64
        + knight.wealth.sense as f64
        + knight.wealth.adapt as f64)
    - (merc.wealth.raid as f64 + merc.wealth.sense as f64 + merc.wealth.adapt as f64);
    let employment_bonus = if knight.employer.as_deref() == Some(king.id.as_str()) {
        d.employment_bonus
    } else {
        0.0
    };
    let p = d.base_knight_winrate + (sigmoid(d.trait_advantage_weight * trait_delta) - 0.5)
    + employment_bonus;
    clamp(p, d.clamp_min, d.clamp_max)
}

/// Why a bribe was rejected, if it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BribeRejectReason {
    /// The King's threshold did not cover the computed raid value.
    ThresholdTooLow,
    /// The threshold covered the raid value, but the King lacks the funds.
    InsufficientFunds,
}

/// Outcome of [`resolve_bribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BribeOutcome {
    /// The King pays `amount` to avert the raid.
    Accepted {
        /// Currency paid to the Mercenary.
        amount: u64,
        /// Fraction of the King's wealth lost to leakage afterward, times 1e9
        /// (fixed-point to keep this type `Eq`); see [`BribeOutcome::leakage`].
        leakage_nanos: u64,
    },
    /// No bribe is paid; the caller falls through to a contest.
    Rejected {
        /// Why the bribe was rejected.
        reason: BribeRejectReason,
    },
}

impl BribeOutcome {
    /// Returns the configured leakage fraction as an `f64`.
    #[must_use]
    pub fn leakage(self) -> Option<f64> {
        match self {
            Self::Accepted { leakage_nanos,.. } => Some(leakage_nanos as f64 / 1e9),
            Self::Rejected {.. } => None,
        }
    }
}

/// Decides whether `king` bribes `merc` to avert a raid.
#[must_use]
pub fn resolve_bribe(king: &Agent, rv: f64, cfg: &Config) -> BribeOutcome {
    let t = king.bribe_threshold as f64;
    if t >= rv {
        if king.currency >= king.bribe_threshold {
            BribeOutcome::Accepted {
                amount: king.bribe_threshold,
                leakage_nanos: (cfg.economic.bribe_leakage * 1e9) as u64,
            }
        } else {
            BribeOutcome::Rejected {
                reason: BribeRejectReason::InsufficientFunds,
            }
        }
    } else {
        BribeOutcome::Rejected {
            reason: BribeRejectReason::ThresholdTooLow,
        }
    }
}

/// Outcome of [`resolve_defend`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefendOutcome {
    /// Whether the defending Knight won the contest.
    pub knight_wins: bool,
    /// Currency staked by both parties.
    pub stake: u64,
    /// The Knight's win probability used to resolve the contest.
    pub p_knight: f64,
}

/// Resolves a defend contest between `knight` and `merc`. Ties at
/// exactly `p == 0.5` are broken lexicographically by id: the lower id
/// wins.
#[must_use]
pub fn resolve_defend(knight: &Agent, merc: &Agent, king: &Agent, cfg: &Config) -> DefendOutcome {
    let p = p_knight_win(knight, merc, king, cfg);
    resolve_defend_at(knight, merc, p, cfg)
}

/// As [`resolve_defend`], but takes the Knight's win probability as an
/// input rather than computing it from [`p_knight_win`]. Used by callers
/// (e.g. a policy-overridden `p_knight_win` slot) that need to supply
/// their own probability while reusing the tie-break and staking rules.
#[must_use]
pub fn resolve_defend_at(knight: &Agent, merc: &Agent, p: f64, cfg: &Config) -> DefendOutcome {
    let knight_wins = if (p - 0.5).abs() < f64::EPSILON {
        knight.id < merc.id
    } else {
        p > 0.5
    };
    let combined = knight.currency + merc.currency;
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let stake = (cfg.economic.defend_resolution.stake_currency_frac * combined as f64).floor()
    as u64;
    DefendOutcome {
        knight_wins,
        stake,
        p_knight: p,
    }
}

/// Applies an accepted bribe: moves `amount` from `king` to `merc`, then
/// scales `king`'s wealth down by `1 - leakage` (floored per trait).
/// Currency and wealth stay non-negative on both sides.
pub fn apply_bribe_outcome(king: &mut Agent, merc: &mut Agent, amount: u64, leakage: f64) {
    let paid = amount.min(king.currency);
    king.currency -= paid;
    merc.currency += paid;
    king.wealth = king.wealth.scale(1.0 - leakage);
}

/// Applies mirrored losses from `king` to `merc` on an unopposed raid or a
/// lost defense.
pub fn apply_mirrored_losses(king: &mut Agent, merc: &mut Agent, cfg: &Config) {
    let loss_frac = cfg.economic.on_failed_bribe.king_currency_loss_frac;
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    let lose_c = (king.currency as f64 * loss_frac).floor() as u64;
    king.currency -= lose_c;
    merc.currency += lose_c;

    let wealth_frac = cfg.economic.on_failed_bribe.king_wealth_loss_frac;
    for name in crate::models::TRAIT_NAMES {
        let Some(v) = king.wealth.get(name) else {
            continue;
        };
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let lose_w = (v as f64 * wealth_frac).floor() as i64;
        king.wealth.add(name, -lose_w);
        merc.wealth.add(name, lose_w);
    }
}

/// Pays a bounty from `merc` to `knight` on a won defense: `frac` of the
/// `raid` and `adapt` traits, floored.
pub fn apply_bounty(knight: &mut Agent, merc: &mut Agent, frac: f64) {
    for name in ["raid", "adapt"] {
        let Some(v) = merc.wealth.get(name) else {
            continue;
        };
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        let moved = (v as f64 * frac).floor() as i64;
        merc.wealth.add(name, -moved);
        knight.wealth.add(name, moved);
    }
}

/// Transfers `stake` from `merc` to `knight`, capped at `merc`'s balance so
/// the transfer can never overdraft; `merc`'s currency never goes negative.
pub fn apply_stake_to_knight(knight: &mut Agent, merc: &mut Agent, stake: u64) {
    let paid = stake.min(merc.currency);
    merc.currency -= paid;
    knight.currency += paid;
}
