//! Crate-wide error taxonomy.
//!
//! Each subsystem owns its own error enum so call sites can match narrowly;
//! [`MinceError`] composes them for callers that just want to propagate
//! failures to the top (`Engine::process_tick` and friends).

use thiserror::Error;

use crate::models::Role;

/// Errors raised while constructing or mutating a model value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Attempted to construct an `Agent` or `WealthTraits` with a negative
    /// currency or trait value.
    #[error("invalid model: {field} must be non-negative, got {value}")]
    InvalidModel {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
    /// An agent id did not carry the prefix expected for its role.
    #[error("agent id {id:?} does not match role prefix for {role:?}")]
    RolePrefixMismatch {
        /// The offending id.
        id: String,
        /// The role whose prefix was expected.
        role: Role,
    },
}

/// Errors raised while loading or validating a [`crate::config::Config`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more validation checks failed; all failures are collected
    /// rather than stopping at the first.
    #[error("config invalid: {errors:?}")]
    Invalid {
        /// Human-readable description of each failed check.
        errors: Vec<String>,
    },
}

/// Errors raised by the agent registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `assign_roles` was called with a tape id already bound to an agent.
    #[error("duplicate tape id: {0}")]
    DuplicateTapeId(u64),
    /// A lookup referenced an agent id that does not exist in the registry.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

/// Errors raised while parsing or compiling a policy expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The lexer or parser rejected the expression text.
    #[error("policy parse error at offset {offset}: {message}")]
    ParseError {
        /// Byte offset into the source expression where the error was detected.
        offset: usize,
        /// Human-readable description.
        message: String,
    },
    /// The expression referenced a parameter or attribute path not in scope
    /// for the policy slot being compiled.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    /// The AST contained a node outside the whitelisted grammar (a call to a
    /// non-whitelisted function, an assignment, an import, etc).
    #[error("unsafe operation: {0}")]
    UnsafeOperation(String),
    /// An operand had a type incompatible with the operator or function
    /// applying it (e.g. boolean `and` over a numeric operand).
    #[error("type error: {0}")]
    TypeError(String),
}

/// A fatal, non-recoverable violation of a core invariant. Always
/// indicates a logic bug in the engine, never bad input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invariant violated: {which}")]
pub struct InvariantViolation {
    /// Human-readable description of which invariant was violated, e.g.
    /// `"K-01's employer N-03 is not a King"`.
    pub which: String,
}

/// Top-level error type returned by fallible `Engine` operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MinceError {
    /// See [`ModelError`].
    #[error(transparent)]
    Model(#[from] ModelError),
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// See [`PolicyError`].
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// A tick aborted because a core invariant was violated mid-phase.
    #[error("tick {tick} failed: {cause}")]
    TickFailed {
        /// The tick during which the failure occurred.
        tick: u64,
        /// The underlying invariant violation.
        cause: InvariantViolation,
    },
}
