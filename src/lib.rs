// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! mince: deterministic tick engine for the M|inc economic simulation layer.
//!
//! An `Engine` advances a fixed population of agents (Kings, Knights,
//! Mercenaries) through a four-phase tick: trait drip, trade, retainer
//! payment, and raid/bribe/defend interactions. Every run is fully
//! reproducible given the same seed, config, and input epochs.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
        clippy::all,
        clippy::pedantic,
        clippy::nursery,
        clippy::cargo,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::dbg_macro,
        clippy::print_stdout,
        clippy::print_stderr
)]
#![allow(
        clippy::must_use_candidate,
        clippy::return_self_not_must_use,
        clippy::unreadable_literal,
        clippy::missing_const_for_fn,
        clippy::suboptimal_flops,
        clippy::redundant_pub_crate,
        clippy::many_single_char_names,
        clippy::module_name_repetitions,
        clippy::use_self,
        clippy::cognitive_complexity,
        clippy::option_if_let_else,
        clippy::significant_drop_tightening,
        clippy::doc_markdown,
        clippy::too_many_lines,
        clippy::struct_excessive_bools,
        clippy::too_long_first_doc_paragraph,
        clippy::missing_errors_doc,
        clippy::missing_panics_doc,
        clippy::similar_names,
        clippy::trivially_copy_pass_by_ref,
        clippy::needless_collect,
        clippy::manual_let_else,
        clippy::needless_pass_by_value,
        clippy::multiple_crate_versions
)]

/// Event aggregation into per-tick metrics (Gini, entropy, currency flows).
pub mod aggregator;
/// Canonical-state LRU cache for deterministic encounter outcomes.
pub mod cache;
/// Typed configuration tree and deterministic content hashing.
pub mod config;
/// Pure economic formulas and the transfer appliers that use them.
pub mod economics;
/// Crate-wide error taxonomy.
pub mod error;
/// The tick orchestrator: `Engine` and its phase functions.
pub mod engine;
/// Core data model: agents, wealth traits, events, tick results.
pub mod models;
/// The whitelisted policy expression compiler.
pub mod policy;
/// Deterministic seeded PRNG.
pub mod rng;
/// Agent registry: role assignment, employer binding, lookups.
pub mod registry;
/// Refractory-aware signal channels.
pub mod signals;
/// Telemetry sink trait and implementations.
pub mod telemetry;

pub use config::Config;
pub use engine::Engine;
pub use error::{ConfigError, InvariantViolation, MinceError, ModelError, PolicyError, RegistryError};
pub use models::{Agent, AgentSnapshot, EpochData, Event, EventKind, Role, TickMetrics, TickResult, WealthTraits};
pub use policy::{CompiledPolicies, PolicySources};
pub use telemetry::{JsonLinesTelemetrySink, NullTelemetrySink, TelemetrySink};
