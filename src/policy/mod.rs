//! Policy Compiler: a whitelisted arithmetic/boolean expression DSL used to
//! parameterize four tick-engine decision points without recompiling the
//! crate.
//!
//! Expressions are lexed, parsed into an AST, and validated against a
//! fixed function whitelist at compile time (`CompiledPolicies::compile`).
//! Evaluation walks the AST against a flat parameter table; no host
//! function call, allocation of file handles, or access to wall-clock time
//! is reachable from this module, which is what makes a compiled policy
//! safe to run on every tick without sandboxing.

mod ast;
mod compiler;
mod lexer;
mod parser;

pub use compiler::{compile, CompiledExpr, ParamTable, Value};

use crate::error::PolicyError;

/// Default policy source for each slot, used when a [`Config`] does not
/// override it. These mirror the formulas in [`crate::economics`] so that
/// an engine run with no policy overrides behaves identically to one
/// computed directly by that module.
///
/// [`Config`]: crate::config::Config
pub mod defaults {
    /// Default `raid_value` expression. `king.defend_projection` and
    /// `king.wealth_exposed` are precomputed by the engine via
    /// [`crate::economics::king_defend_projection`] and
    /// [`crate::economics::wealth_exposed`], since neither is expressible
    /// as a whitelisted call over a single agent's fields.
    pub const RAID_VALUE: &str = "max(alpha_raid * merc.wealth.raid + beta_sense_adapt * (merc.wealth.sense + merc.wealth.adapt) - gamma_king_defend * king.defend_projection + delta_king_exposed * king.wealth_exposed, 0)";

    /// Default `bribe_outcome` acceptance condition: the King's threshold
    /// covers the computed raid value. Whether the King also has the funds
    /// to pay it is resolved separately by the engine (it changes which
    /// event is emitted, not whether this slot's condition holds).
    pub const BRIBE_ACCEPT: &str = "king.bribe_threshold >= raid_value";

    /// Default `p_knight_win` expression, pre-clamped to `[clamp_min, clamp_max]`.
    pub const P_KNIGHT_WIN: &str = "clamp(base_knight_winrate + (sigmoid(trait_advantage_weight * ((knight.wealth.defend + knight.wealth.sense + knight.wealth.adapt) - (merc.wealth.raid + merc.wealth.sense + merc.wealth.adapt))) - 0.5) + knight.employment_bonus, clamp_min, clamp_max)";

    /// Default `trade_action` condition: always participate.
    pub const TRADE_ACTION: &str = "true";
}

/// The four policy slots exposed to the tick engine, each independently
/// compiled and independently overridable.
#[derive(Debug, Clone)]
pub struct CompiledPolicies {
    /// Computes a mercenary's perceived value of raiding a given king.
    pub raid_value: CompiledExpr,
    /// Decides whether a king accepts a bribe at a given raid value.
    pub bribe_outcome: CompiledExpr,
    /// Computes a knight's win probability in a defend contest.
    pub p_knight_win: CompiledExpr,
    /// Decides whether an agent participates in the trade phase this tick.
    pub trade_action: CompiledExpr,
}

impl CompiledPolicies {
    /// Compiles all four policy slots from source, falling back to
    /// [`defaults`] for any `None` override.
    ///
    /// # Errors
    /// Returns the first [`PolicyError`] encountered, in slot order
    /// `raid_value`, `bribe_outcome`, `p_knight_win`, `trade_action`.
    pub fn compile(overrides: &PolicySources) -> Result<Self, PolicyError> {
        Ok(Self {
                raid_value: compiler::compile(overrides.raid_value.as_deref().unwrap_or(defaults::RAID_VALUE))?,
                bribe_outcome: compiler::compile(
                    overrides.bribe_outcome.as_deref().unwrap_or(defaults::BRIBE_ACCEPT),
                )?,
                p_knight_win: compiler::compile(
                    overrides.p_knight_win.as_deref().unwrap_or(defaults::P_KNIGHT_WIN),
                )?,
                trade_action: compiler::compile(
                    overrides.trade_action.as_deref().unwrap_or(defaults::TRADE_ACTION),
                )?,
        })
    }

    /// Validates a full set of sources without constructing a usable
    /// engine, returning every error found rather than stopping at the
    /// first.
    #[must_use]
    pub fn validate(sources: &PolicySources) -> Vec<String> {
        let mut errors = Vec::new();
        let fields: [(&str, Option<&str>, &str); 4] = [
            ("raid_value", sources.raid_value.as_deref(), defaults::RAID_VALUE),
            ("bribe_outcome", sources.bribe_outcome.as_deref(), defaults::BRIBE_ACCEPT),
            ("p_knight_win", sources.p_knight_win.as_deref(), defaults::P_KNIGHT_WIN),
            ("trade_action", sources.trade_action.as_deref(), defaults::TRADE_ACTION),
        ];
        for (name, src, default_src) in fields {
            let text = src.unwrap_or(default_src);
            for msg in compiler::validate_only(text) {
                errors.push(format!("{name}: {msg}"));
            }
        }
        errors
    }
}

/// Optional source overrides for each policy slot, as loaded from
/// configuration. `None` falls back to [`defaults`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolicySources {
    /// Override source for the `raid_value` slot.
    pub raid_value: Option<String>,
    /// Override source for the `bribe_outcome` slot.
    pub bribe_outcome: Option<String>,
    /// Override source for the `p_knight_win` slot.
    pub p_knight_win: Option<String>,
    /// Override source for the `trade_action` slot.
    pub trade_action: Option<String>,
}
