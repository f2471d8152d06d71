//! Restricted interpreter for Skeptic-authored verification scripts.
//!
//! Scripts are written in a small Python dialect with a symbolic-math
//! toolkit bound to `sp`. Nothing outside the allow-listed builtins and the
//! toolkit is reachable: there is no filesystem, process, or network access,
//! and every run starts from a fresh scope that is dropped afterwards.
//!
//! The verdict is read from the `is_correct` binding once the script ends.

mod ast;
mod builtins;
mod error;
mod expr;
mod interp;
mod lexer;
mod parser;
mod toolkit;
mod value;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::ScriptError;

use crate::core::script::interp::Interpreter;
use crate::core::script::value::Value;

pub const NO_CODE_MESSAGE: &str = "No code provided";
pub const MATCH_MESSAGE: &str = "Symbolic Match Confirmed";
pub const MISMATCH_MESSAGE: &str = "Symbolic Mismatch (Math logic returned False)";
const EXECUTION_ERROR_PREFIX: &str = "Execution Error: ";

/// Result of running one verification script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub symbolic_passed: bool,
    pub message: String,
    pub is_execution_error: bool,
}

impl VerificationOutcome {
    fn passed() -> Self {
        Self {
            symbolic_passed: true,
            message: MATCH_MESSAGE.to_string(),
            is_execution_error: false,
        }
    }

    fn mismatch() -> Self {
        Self {
            symbolic_passed: false,
            message: MISMATCH_MESSAGE.to_string(),
            is_execution_error: false,
        }
    }

    fn no_code() -> Self {
        Self {
            symbolic_passed: false,
            message: NO_CODE_MESSAGE.to_string(),
            is_execution_error: false,
        }
    }

    fn execution_error(err: &ScriptError) -> Self {
        Self {
            symbolic_passed: false,
            message: format!("{EXECUTION_ERROR_PREFIX}{err}"),
            is_execution_error: true,
        }
    }
}

/// Resource limits for a single script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Scripts longer than this are rejected before parsing.
    pub max_script_bytes: usize,
    /// Statements, loop iterations and comprehension items share this budget.
    pub step_budget: u64,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_script_bytes: 20_000,
            step_budget: 100_000,
        }
    }
}

/// Run `code` with the default limits.
pub fn run_verification(code: &str) -> VerificationOutcome {
    run_verification_with(code, &ScriptLimits::default())
}

/// Run `code` and report whether `is_correct` ended up true.
pub fn run_verification_with(code: &str, limits: &ScriptLimits) -> VerificationOutcome {
    if code.trim().is_empty() {
        return VerificationOutcome::no_code();
    }
    let outcome = match execute(code, limits) {
        Ok(true) => VerificationOutcome::passed(),
        Ok(false) => VerificationOutcome::mismatch(),
        Err(err) => VerificationOutcome::execution_error(&err),
    };
    debug!(
        symbolic_passed = outcome.symbolic_passed,
        is_execution_error = outcome.is_execution_error,
        message = %outcome.message,
        "verification script finished"
    );
    outcome
}

fn execute(code: &str, limits: &ScriptLimits) -> Result<bool, ScriptError> {
    if code.len() > limits.max_script_bytes {
        return Err(ScriptError::TooLarge {
            size: code.len(),
            limit: limits.max_script_bytes,
        });
    }
    let program = parser::parse_program(code)?;
    let mut interp = Interpreter::new(limits.step_budget);
    interp.run(&program)?;
    for line in interp.output() {
        debug!(line = %line, "script output");
    }
    debug!(steps = interp.steps(), "script executed");
    Ok(interp.global("is_correct").is_some_and(verdict))
}

/// Symbolic values only pass when they simplify to an unambiguous `True`.
///
/// Anything exposing `simplify` is simplified and compared with `True`. An
/// expression simplifies to another expression, never to a boolean, so a
/// bare expression verdict is always a mismatch; relations can collapse to
/// `True`.
fn verdict(value: &Value) -> bool {
    match value {
        Value::Expr(_) => false,
        Value::Rel(relation) => matches!(relation.simplify(), Ok(true)),
        other => other.truthy().unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> VerificationOutcome {
        run_verification(code)
    }

    #[test]
    fn empty_code_is_not_executed() {
        for code in ["", "   \n\t"] {
            let outcome = run(code);
            assert_eq!(outcome, VerificationOutcome::no_code());
            assert!(!outcome.is_execution_error);
        }
    }

    #[test]
    fn literal_verdicts() {
        assert!(run("is_correct = True").symbolic_passed);
        let outcome = run("is_correct = False");
        assert_eq!(outcome.message, MISMATCH_MESSAGE);
        assert!(!outcome.is_execution_error);
    }

    #[test]
    fn unbound_verdict_is_a_mismatch() {
        let outcome = run("x = 1 + 1");
        assert!(!outcome.symbolic_passed);
        assert_eq!(outcome.message, MISMATCH_MESSAGE);
    }

    #[test]
    fn syntax_errors_are_execution_errors() {
        let outcome = run("is_correct = (");
        assert!(!outcome.symbolic_passed);
        assert!(outcome.is_execution_error);
        assert!(outcome.message.starts_with("Execution Error: "));
    }

    #[test]
    fn undefined_names_are_execution_errors() {
        let outcome = run("is_correct = y == 2");
        assert!(outcome.is_execution_error);
        assert_eq!(outcome.message, "Execution Error: name 'y' is not defined");
    }

    #[test]
    fn derivative_inverse_check_passes() {
        let script = "x = sp.Symbol('x')\n\
                      F = x**3/3 - x\n\
                      f = x**2 - 1\n\
                      is_correct = sp.simplify(sp.diff(F, x) - f) == 0\n";
        let outcome = run(script);
        assert_eq!(outcome.message, MATCH_MESSAGE);
        assert!(outcome.symbolic_passed);
    }

    #[test]
    fn wrong_derivative_is_a_mismatch() {
        let script = "x = sp.Symbol('x')\n\
                      is_correct = sp.simplify(sp.diff(x**3, x) - 2*x**2) == 0\n";
        assert_eq!(run(script), VerificationOutcome::mismatch());
    }

    #[test]
    fn equation_verdict_is_simplified() {
        let script = "x = sp.symbols('x')\n\
                      is_correct = sp.Eq(sp.sin(x)**2 + sp.cos(x)**2, 1)\n";
        assert!(run(script).symbolic_passed);

        let script = "x = sp.symbols('x')\n\
                      is_correct = sp.Eq(x**2, x)\n";
        assert!(!run(script).symbolic_passed);
    }

    #[test]
    fn bare_expression_verdict_must_simplify_to_true() {
        let script = "x = sp.Symbol('x')\nis_correct = x + 1\n";
        let outcome = run(script);
        assert!(!outcome.symbolic_passed);
        assert!(!outcome.is_execution_error);
    }

    #[test]
    fn disallowed_imports_are_execution_errors() {
        let outcome = run("import os\nis_correct = True\n");
        assert!(outcome.is_execution_error);
        assert!(outcome.message.contains("'os'"));

        assert!(run("import sympy as sym\nx = sym.Symbol('x')\nis_correct = sym.diff(x**2, x) == 2*x\n").symbolic_passed);
        assert!(run("from sympy import symbols, diff\nx = symbols('x')\nis_correct = diff(x, x) == 1\n").symbolic_passed);
    }

    #[test]
    fn ode_solution_substitution() {
        let script = "t = sp.Symbol('t')\n\
                      k = sp.Symbol('k')\n\
                      y = 5*sp.exp(-k*t)\n\
                      residual = sp.diff(y, t) + k*y\n\
                      initial = y.subs(t, 0)\n\
                      is_correct = sp.simplify(residual) == 0 and initial == 5\n";
        assert!(run(script).symbolic_passed);
    }

    #[test]
    fn definite_integral_check() {
        let script = "x = sp.Symbol('x')\n\
                      area = sp.integrate(3*x**2, (x, 0, 2))\n\
                      is_correct = area == 8\n";
        assert!(run(script).symbolic_passed);
    }

    #[test]
    fn loops_and_helper_functions() {
        let script = "def close(a, b, tol=1e-9):\n    return abs(a - b) < tol\n\
                      values = []\n\
                      for n in range(1, 4):\n    values.append(n * (n + 1) / 2)\n\
                      is_correct = all(close(v, e) for v, e in zip(values, [1, 3, 6]))\n";
        assert!(run(script).symbolic_passed);
    }

    #[test]
    fn integer_overflow_in_floor_division_does_not_abort() {
        for op in ["//", "%"] {
            let script = format!("a = -9223372036854775807 - 1\nb = a {op} -1\nis_correct = True\n");
            assert!(run(&script).symbolic_passed, "{op}");
        }
    }

    #[test]
    fn runaway_scripts_hit_the_step_budget() {
        let limits = ScriptLimits {
            step_budget: 500,
            ..ScriptLimits::default()
        };
        let outcome = run_verification_with(
            "total = 0\nfor i in range(10000):\n    total += i\nis_correct = True\n",
            &limits,
        );
        assert!(outcome.is_execution_error);
        assert!(outcome.message.contains("execution budget"));
    }

    #[test]
    fn oversized_scripts_are_rejected() {
        let limits = ScriptLimits {
            max_script_bytes: 16,
            ..ScriptLimits::default()
        };
        let outcome = run_verification_with("is_correct = True and True", &limits);
        assert!(outcome.is_execution_error);
        assert!(!outcome.symbolic_passed);
    }

    #[test]
    fn print_never_reaches_the_host() {
        let outcome = run("print('checking')\nis_correct = 2 + 2 == 4\n");
        assert!(outcome.symbolic_passed);
    }
}
