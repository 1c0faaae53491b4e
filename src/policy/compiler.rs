//! AST validation, compilation, and evaluation (steps 2–3).

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policy::ast::{BinOp, Expr, WHITELISTED_FNS};
use crate::policy::parser::parse;

/// A runtime value produced by evaluating a compiled expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// A numeric value.
    Number(f64),
    /// A boolean value.
    Bool(bool),
}

impl Value {
    fn as_number(self) -> Result<f64, PolicyError> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Bool(_) => Err(PolicyError::TypeError(
                    "expected number, found bool".to_string(),
            )),
        }
    }

    fn as_bool(self) -> Result<bool, PolicyError> {
        match self {
            Self::Bool(b) => Ok(b),
            Self::Number(_) => Err(PolicyError::TypeError(
                    "expected bool, found number".to_string(),
            )),
        }
    }
}

/// Flat parameter table supplied at evaluation time: dotted attribute paths
/// (e.g. `merc.wealth.raid`) and bare names (e.g. `tick`) map directly to
/// values. Building this table is the caller's responsibility (the tick
/// engine flattens whichever agents are in scope for the policy slot being
/// evaluated).
pub type ParamTable = BTreeMap<String, Value>;

/// A parsed and whitelist-validated expression, ready to evaluate
/// repeatedly against different parameter tables without re-parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    ast: Expr,
}

/// Compiles `src` into a [`CompiledExpr`], rejecting any node outside the
/// whitelisted grammar.
///
/// # Errors
/// Returns [`PolicyError::ParseError`] on malformed syntax, or
/// [`PolicyError::UnsafeOperation`] if a `Call` node names a function
/// outside [`WHITELISTED_FNS`].
pub fn compile(src: &str) -> Result<CompiledExpr, PolicyError> {
    let ast = parse(src)?;
    validate(&ast)?;
    Ok(CompiledExpr { ast })
}

fn validate(expr: &Expr) -> Result<(), PolicyError> {
    match expr {
        Expr::Number(_) | Expr::Bool(_) | Expr::Ident(_) => Ok(()),
        Expr::Neg(inner) | Expr::Not(inner) => validate(inner),
        Expr::Binary(_, lhs, rhs) => {
            validate(lhs)?;
            validate(rhs)
        }
        Expr::Call(name, args) => {
            if !WHITELISTED_FNS.contains(&name.as_str()) {
                return Err(PolicyError::UnsafeOperation(format!(
                            "call to non-whitelisted function: {name}"
                )));
            }
            for arg in args {
                validate(arg)?;
            }
            Ok(())
        }
    }
}

/// Returns a validation error list without executing the expression.
/// Empty on success.
#[must_use]
pub fn validate_only(src: &str) -> Vec<String> {
    match compile(src) {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    }
}

impl CompiledExpr {
    /// Evaluates this expression against `params`. Determinism follows from
    /// the AST being pure: only `params` and literal constants are read, no
    /// wall-clock or RNG access exists in this evaluator.
    ///
    /// # Errors
    /// Returns [`PolicyError::UnknownIdentifier`] if an identifier path is
    /// missing from `params`, or [`PolicyError::TypeError`] on an
    /// operand/operator type mismatch.
    pub fn eval(&self, params: &ParamTable) -> Result<Value, PolicyError> {
        eval_expr(&self.ast, params)
    }

    /// Convenience for boolean-slot policies (trait-emergence conditions,
    /// bribe-outcome conditions): evaluates and coerces to `bool`.
    ///
    /// # Errors
    /// As [`CompiledExpr::eval`], plus a type error if the result is numeric.
    pub fn eval_bool(&self, params: &ParamTable) -> Result<bool, PolicyError> {
        self.eval(params)?.as_bool()
    }

    /// Convenience for numeric-slot policies (raid_value, p_knight_win):
    /// evaluates and coerces to `f64`.
    ///
    /// # Errors
    /// As [`CompiledExpr::eval`], plus a type error if the result is boolean.
    pub fn eval_number(&self, params: &ParamTable) -> Result<f64, PolicyError> {
        self.eval(params)?.as_number()
    }
}

fn eval_expr(expr: &Expr, params: &ParamTable) -> Result<Value, PolicyError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Ident(path) => params
            .get(path)
            .copied()
            .ok_or_else(|| PolicyError::UnknownIdentifier(path.clone())),
        Expr::Neg(inner) => Ok(Value::Number(-eval_expr(inner, params)?.as_number()?)),
        Expr::Not(inner) => Ok(Value::Bool(!eval_expr(inner, params)?.as_bool()?)),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, params),
        Expr::Call(name, args) => eval_call(name, args, params),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, params: &ParamTable) -> Result<Value, PolicyError> {
    match op {
        BinOp::And => {
            let l = eval_expr(lhs, params)?.as_bool()?;
            if !l {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(rhs, params)?.as_bool()?))
        }
        BinOp::Or => {
            let l = eval_expr(lhs, params)?.as_bool()?;
            if l {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(rhs, params)?.as_bool()?))
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = eval_expr(lhs, params)?.as_number()?;
            let r = eval_expr(rhs, params)?.as_number()?;
            let result = match op {
                BinOp::Eq => (l - r).abs() < f64::EPSILON,
                BinOp::Ne => (l - r).abs() >= f64::EPSILON,
                BinOp::Lt => l < r,
                BinOp::Le => l <= r,
                BinOp::Gt => l > r,
                BinOp::Ge => l >= r,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let l = eval_expr(lhs, params)?.as_number()?;
            let r = eval_expr(rhs, params)?.as_number()?;
            let result = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(PolicyError::TypeError("division by zero".to_string()));
                    }
                    l / r
                }
                BinOp::Mod => {
                    if r == 0.0 {
                        return Err(PolicyError::TypeError("modulo by zero".to_string()));
                    }
                    l % r
                }
                _ => unreachable!(),
            };
            Ok(Value::Number(result))
        }
    }
}

fn eval_call(name: &str, args: &[Expr], params: &ParamTable) -> Result<Value, PolicyError> {
    let nums = args
        .iter()
        .map(|a| eval_expr(a, params).and_then(Value::as_number))
        .collect::<Result<Vec<f64>, PolicyError>>()?;
    match name {
        "sigmoid" => {
            expect_arity(name, &nums, 1)?;
            Ok(Value::Number(crate::economics::sigmoid(nums[0])))
        }
        "clamp" => {
            expect_arity(name, &nums, 3)?;
            Ok(Value::Number(crate::economics::clamp(nums[0], nums[1], nums[2])))
        }
        "min" => {
            expect_arity(name, &nums, 2)?;
            Ok(Value::Number(nums[0].min(nums[1])))
        }
        "max" => {
            expect_arity(name, &nums, 2)?;
            Ok(Value::Number(nums[0].max(nums[1])))
        }
        "abs" => {
            expect_arity(name, &nums, 1)?;
            Ok(Value::Number(nums[0].abs()))
        }
        other => Err(PolicyError::UnsafeOperation(format!(
                    "call to non-whitelisted function: {other}"
        ))),
    }
}

fn expect_arity(name: &str, args: &[f64], n: usize) -> Result<(), PolicyError> {
    if args.len() == n {
        Ok(())
    } else {
        Err(PolicyError::TypeError(format!(
                    "{name} expects {n} argument(s), got {}",
                    args.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> ParamTable {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn evaluates_trait_emergence_condition() {
        let compiled = compile("copy >= 12 and tick % 2 == 0").unwrap();
        let p = params(&[("copy", Value::Number(12.0)), ("tick", Value::Number(4.0))]);
        assert!(compiled.eval_bool(&p).unwrap());

        let p_odd_tick = params(&[("copy", Value::Number(12.0)), ("tick", Value::Number(5.0))]);
        assert!(!compiled.eval_bool(&p_odd_tick).unwrap());
    }

    #[test]
    fn rejects_non_whitelisted_call() {
        let err = compile("exec(1)").unwrap_err();
        assert!(matches!(err, PolicyError::UnsafeOperation(_)));
    }

    #[test]
    fn unknown_identifier_errors_at_eval_time() {
        let compiled = compile("ghost_param + 1").unwrap();
        let err = compiled.eval_number(&ParamTable::new()).unwrap_err();
        assert!(matches!(err, PolicyError::UnknownIdentifier(_)));
    }

    #[test]
    fn type_mismatch_errors() {
        let compiled = compile("true + 1").unwrap();
        let err = compiled.eval(&ParamTable::new()).unwrap_err();
        assert!(matches!(err, PolicyError::TypeError(_)));
    }

    #[test]
    fn whitelisted_helpers_are_callable() {
        let compiled = compile("clamp(sigmoid(x), 0, 1)").unwrap();
        let p = params(&[("x", Value::Number(1000.0))]);
        let result = compiled.eval_number(&p).unwrap();
        assert!((result - 1.0).abs() < 1e-12);
    }

    #[test]
    fn evaluation_is_deterministic_across_repeated_calls() {
        let compiled = compile("merc.wealth.raid * 2 + king.currency").unwrap();
        let p = params(&[
                ("merc.wealth.raid", Value::Number(11.0)),
                ("king.currency", Value::Number(5400.0)),
        ]);
        let a = compiled.eval_number(&p).unwrap();
        let b = compiled.eval_number(&p).unwrap();
        assert_eq!(a, b);
        assert!((a - 5422.0).abs() < 1e-9);
    }
}
