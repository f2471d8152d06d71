//! The `sympy`-style toolkit and `math` module exposed to scripts, plus
//! attribute and method dispatch on runtime values.

use crate::core::script::builtins::{check_arity, kwarg};
use crate::core::script::error::{ScriptError, ScriptResult, type_error};
use crate::core::script::expr::{Constant, Func, RelOp, Relation, Symbolic, round_significant};
use crate::core::script::interp::Interpreter;
use crate::core::script::value::{Module, Value, values_equal};

const LIMIT_STEPS: [f64; 4] = [1e-3, 1e-4, 1e-5, 1e-6];

/// Callable exported by the `sympy` or `math` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolkitFn {
    Symbol,
    Symbols,
    Integer,
    Float,
    Rational,
    Sympify,
    Sqrt,
    Elementary(Func),
    Diff,
    Integrate,
    Simplify,
    Expand,
    Relational(RelOp),
    Evalf,
    Solve,
    Limit,
    MathElementary(Func),
    MathSqrt,
    MathIsclose,
    MathFloor,
    MathCeil,
    MathPow,
}

impl ToolkitFn {
    pub fn name(self) -> &'static str {
        match self {
            ToolkitFn::Symbol => "Symbol",
            ToolkitFn::Symbols => "symbols",
            ToolkitFn::Integer => "Integer",
            ToolkitFn::Float => "Float",
            ToolkitFn::Rational => "Rational",
            ToolkitFn::Sympify => "sympify",
            ToolkitFn::Sqrt | ToolkitFn::MathSqrt => "sqrt",
            ToolkitFn::Elementary(f) | ToolkitFn::MathElementary(f) => f.name(),
            ToolkitFn::Diff => "diff",
            ToolkitFn::Integrate => "integrate",
            ToolkitFn::Simplify => "simplify",
            ToolkitFn::Expand => "expand",
            ToolkitFn::Relational(op) => match op {
                RelOp::Eq => "Eq",
                RelOp::Ne => "Ne",
                RelOp::Lt => "Lt",
                RelOp::Le => "Le",
                RelOp::Gt => "Gt",
                RelOp::Ge => "Ge",
            },
            ToolkitFn::Evalf => "N",
            ToolkitFn::Solve => "solve",
            ToolkitFn::Limit => "limit",
            ToolkitFn::MathIsclose => "isclose",
            ToolkitFn::MathFloor => "floor",
            ToolkitFn::MathCeil => "ceil",
            ToolkitFn::MathPow => "pow",
        }
    }
}

/// Names bound by `from sympy import *`.
pub const SYMPY_EXPORTS: [&str; 40] = [
    "Symbol", "symbols", "Integer", "Float", "Rational", "S", "sympify", "sqrt", "sin", "cos",
    "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "exp", "log", "ln", "Abs", "diff",
    "Derivative", "integrate", "Integral", "simplify", "trigsimp", "expand", "factor", "Eq",
    "Ne", "Lt", "Le", "Gt", "Ge", "N", "solve", "limit", "pi", "E",
];

/// Names bound by `from math import *`.
pub const MATH_EXPORTS: [&str; 21] = [
    "pi", "e", "tau", "inf", "sqrt", "sin", "cos", "tan", "asin", "acos", "atan", "sinh", "cosh",
    "tanh", "exp", "log", "fabs", "isclose", "floor", "ceil", "pow",
];

fn elementary(name: &str) -> Option<Func> {
    Some(match name {
        "sin" => Func::Sin,
        "cos" => Func::Cos,
        "tan" => Func::Tan,
        "asin" => Func::Asin,
        "acos" => Func::Acos,
        "atan" => Func::Atan,
        "sinh" => Func::Sinh,
        "cosh" => Func::Cosh,
        "tanh" => Func::Tanh,
        "exp" => Func::Exp,
        "log" | "ln" => Func::Log,
        _ => return None,
    })
}

/// Attribute of a module (`sp.diff`, `math.pi`).
pub fn module_attr(module: Module, name: &str) -> ScriptResult<Value> {
    let found = match module {
        Module::Sympy => sympy_attr(name),
        Module::Math => math_attr(name),
    };
    match (found, module) {
        (Some(value), _) => Ok(value),
        (None, Module::Sympy) => Err(ScriptError::ModuleAttribute(name.to_string())),
        (None, Module::Math) => Err(ScriptError::Attribute {
            owner: "module".to_string(),
            attr: format!("math.{name}"),
        }),
    }
}

pub fn sympy_attr(name: &str) -> Option<Value> {
    if let Some(func) = elementary(name) {
        return Some(Value::Toolkit(ToolkitFn::Elementary(func)));
    }
    let function = match name {
        "pi" => return Some(Value::Expr(Symbolic::Const(Constant::Pi))),
        "E" => return Some(Value::Expr(Symbolic::Const(Constant::E))),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "Symbol" => ToolkitFn::Symbol,
        "symbols" => ToolkitFn::Symbols,
        "Integer" => ToolkitFn::Integer,
        "Float" => ToolkitFn::Float,
        "Rational" => ToolkitFn::Rational,
        "S" | "sympify" | "parse_expr" => ToolkitFn::Sympify,
        "sqrt" => ToolkitFn::Sqrt,
        "Abs" => ToolkitFn::Elementary(Func::Abs),
        "diff" | "Derivative" => ToolkitFn::Diff,
        "integrate" | "Integral" => ToolkitFn::Integrate,
        "simplify" | "trigsimp" | "ratsimp" | "cancel" | "together" | "powsimp" | "radsimp"
        | "factor" | "nsimplify" => ToolkitFn::Simplify,
        "expand" => ToolkitFn::Expand,
        "Eq" => ToolkitFn::Relational(RelOp::Eq),
        "Ne" => ToolkitFn::Relational(RelOp::Ne),
        "Lt" => ToolkitFn::Relational(RelOp::Lt),
        "Le" => ToolkitFn::Relational(RelOp::Le),
        "Gt" => ToolkitFn::Relational(RelOp::Gt),
        "Ge" => ToolkitFn::Relational(RelOp::Ge),
        "N" => ToolkitFn::Evalf,
        "solve" => ToolkitFn::Solve,
        "limit" => ToolkitFn::Limit,
        _ => return None,
    };
    Some(Value::Toolkit(function))
}

fn math_attr(name: &str) -> Option<Value> {
    if let Some(func) = elementary(name) {
        return Some(Value::Toolkit(ToolkitFn::MathElementary(func)));
    }
    let function = match name {
        "pi" => return Some(Value::Float(std::f64::consts::PI)),
        "e" => return Some(Value::Float(std::f64::consts::E)),
        "tau" => return Some(Value::Float(std::f64::consts::TAU)),
        "inf" => return Some(Value::Float(f64::INFINITY)),
        "sqrt" => ToolkitFn::MathSqrt,
        "fabs" => ToolkitFn::MathElementary(Func::Abs),
        "isclose" => ToolkitFn::MathIsclose,
        "floor" => ToolkitFn::MathFloor,
        "ceil" => ToolkitFn::MathCeil,
        "pow" => ToolkitFn::MathPow,
        _ => return None,
    };
    Some(Value::Toolkit(function))
}

fn relation_value(result: Result<bool, Relation>) -> Value {
    match result {
        Ok(verdict) => Value::Bool(verdict),
        Err(relation) => Value::Rel(relation),
    }
}

fn symbol_name(value: &Value) -> ScriptResult<String> {
    match value {
        Value::Expr(Symbolic::Sym(name)) => Ok(name.clone()),
        other => Err(ScriptError::Value(format!(
            "expected a symbol, got {}",
            other.repr()
        ))),
    }
}

/// The single free symbol of `expr`, required when no variable is given.
fn implied_symbol(expr: &Symbolic, operation: &str) -> ScriptResult<Option<String>> {
    let mut symbols = expr.free_symbols().into_iter();
    match (symbols.next(), symbols.next()) {
        (None, _) => Ok(None),
        (Some(name), None) => Ok(Some(name)),
        (Some(_), Some(_)) => Err(ScriptError::Value(format!(
            "specify the variable for {operation} of a multivariate expression"
        ))),
    }
}

fn math_number(value: &Value, name: &str) -> ScriptResult<f64> {
    match value {
        Value::Expr(e) if e.is_constant() => Ok(e.eval_constant()),
        other => other.as_f64().ok_or_else(|| {
            type_error(format!(
                "{name}() argument must be a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

pub fn call_toolkit(
    interp: &mut Interpreter,
    function: ToolkitFn,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    let name = function.name();
    match function {
        ToolkitFn::Symbol => {
            check_arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Expr(Symbolic::symbol(s.as_ref()))),
                other => Err(type_error(format!(
                    "Symbol name must be a string, not '{}'",
                    other.type_name()
                ))),
            }
        }
        ToolkitFn::Symbols => {
            check_arity(name, &args, 1, 1)?;
            let Value::Str(spec) = &args[0] else {
                return Err(type_error("symbols() expects a string of names"));
            };
            let mut names: Vec<Value> = spec
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|n| !n.is_empty())
                .map(|n| Value::Expr(Symbolic::symbol(n)))
                .collect();
            match names.len() {
                0 => Err(ScriptError::Value("no symbols given".to_string())),
                1 if !spec.contains(',') => Ok(names.remove(0)),
                _ => Ok(Value::tuple(names)),
            }
        }
        ToolkitFn::Integer => {
            check_arity(name, &args, 1, 1)?;
            let value = match &args[0] {
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(|v| v as f64)
                    .map_err(|_| ScriptError::Value(format!("invalid integer '{s}'")))?,
                other => math_number(other, name)?.trunc(),
            };
            Ok(Value::Expr(Symbolic::num(value)))
        }
        ToolkitFn::Float => {
            check_arity(name, &args, 1, 2)?;
            let value = match &args[0] {
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ScriptError::Value(format!("invalid float '{s}'")))?,
                other => math_number(other, name)?,
            };
            Ok(Value::Expr(Symbolic::num(value)))
        }
        ToolkitFn::Rational => {
            check_arity(name, &args, 1, 2)?;
            let numerator = args[0].to_symbolic()?;
            let denominator = match args.get(1) {
                Some(value) => value.to_symbolic()?,
                None => Symbolic::num(1.0),
            };
            if denominator.as_number() == Some(0.0) {
                return Err(ScriptError::ZeroDivision);
            }
            Ok(Value::Expr(Symbolic::div(numerator, denominator)))
        }
        ToolkitFn::Sympify => {
            check_arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(source) => interp.eval_sympify(source),
                Value::Int(_) | Value::Float(_) => Ok(Value::Expr(args[0].to_symbolic()?)),
                other => Ok(other.clone()),
            }
        }
        ToolkitFn::Sqrt => {
            check_arity(name, &args, 1, 1)?;
            Ok(Value::Expr(Symbolic::pow(
                args[0].to_symbolic()?,
                Symbolic::num(0.5),
            )))
        }
        ToolkitFn::Elementary(func) => {
            check_arity(name, &args, 1, 2)?;
            let arg = args[0].to_symbolic()?;
            let value = Symbolic::func(func, arg);
            match (func, args.get(1)) {
                (Func::Log, Some(base)) => Ok(Value::Expr(Symbolic::div(
                    value,
                    Symbolic::func(Func::Log, base.to_symbolic()?),
                ))),
                (_, None) => Ok(Value::Expr(value)),
                (_, Some(_)) => Err(type_error(format!("{name}() takes 1 argument"))),
            }
        }
        ToolkitFn::Diff => differentiate(&args),
        ToolkitFn::Integrate => integrate(&args),
        ToolkitFn::Simplify => {
            check_arity(name, &args, 1, 1)?;
            Ok(match &args[0] {
                Value::Expr(e) => Value::Expr(e.simplify()),
                Value::Rel(r) => relation_value(r.simplify()),
                Value::Bool(b) => Value::Bool(*b),
                other => Value::Expr(other.to_symbolic()?),
            })
        }
        ToolkitFn::Expand => {
            check_arity(name, &args, 1, 1)?;
            Ok(match &args[0] {
                Value::Rel(r) => relation_value(Relation::build(r.op, r.lhs.expand(), r.rhs.expand())),
                other => Value::Expr(other.to_symbolic()?.expand()),
            })
        }
        ToolkitFn::Relational(op) => {
            check_arity(name, &args, 2, 2)?;
            Ok(relation_value(Relation::build(
                op,
                args[0].to_symbolic()?,
                args[1].to_symbolic()?,
            )))
        }
        ToolkitFn::Evalf => {
            check_arity(name, &args, 1, 2)?;
            evalf(&args[0])
        }
        ToolkitFn::Solve => solve(&args),
        ToolkitFn::Limit => limit(&args),
        ToolkitFn::MathElementary(func) => {
            check_arity(name, &args, 1, 2)?;
            let x = math_number(&args[0], name)?;
            let value = func.apply(x);
            let value = match (func, args.get(1)) {
                (Func::Log, Some(base)) => value / math_number(base, name)?.ln(),
                _ => value,
            };
            if value.is_nan() {
                return Err(ScriptError::Value("math domain error".to_string()));
            }
            Ok(Value::Float(value))
        }
        ToolkitFn::MathSqrt => {
            check_arity(name, &args, 1, 1)?;
            let x = math_number(&args[0], name)?;
            if x < 0.0 {
                return Err(ScriptError::Value("math domain error".to_string()));
            }
            Ok(Value::Float(x.sqrt()))
        }
        ToolkitFn::MathIsclose => {
            check_arity(name, &args, 2, 2)?;
            let a = math_number(&args[0], name)?;
            let b = math_number(&args[1], name)?;
            let rel_tol = kwarg(&kwargs, "rel_tol")
                .and_then(Value::as_f64)
                .unwrap_or(1e-9);
            let abs_tol = kwarg(&kwargs, "abs_tol")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            let close =
                a == b || (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol);
            Ok(Value::Bool(close))
        }
        ToolkitFn::MathFloor | ToolkitFn::MathCeil => {
            check_arity(name, &args, 1, 1)?;
            let x = math_number(&args[0], name)?;
            let rounded = if function == ToolkitFn::MathFloor {
                x.floor()
            } else {
                x.ceil()
            };
            if !rounded.is_finite() {
                return Err(ScriptError::Value(
                    "cannot convert float infinity or NaN to integer".to_string(),
                ));
            }
            Ok(Value::Int(rounded as i64))
        }
        ToolkitFn::MathPow => {
            check_arity(name, &args, 2, 2)?;
            let base = math_number(&args[0], name)?;
            let exponent = math_number(&args[1], name)?;
            let value = base.powf(exponent);
            if value.is_nan() {
                return Err(ScriptError::Value("math domain error".to_string()));
            }
            Ok(Value::Float(value))
        }
    }
}

/// `diff(expr, x)`, `diff(expr, x, 2)`, `diff(expr, x, y)`, `diff(expr)`.
fn differentiate(args: &[Value]) -> ScriptResult<Value> {
    check_arity("diff", args, 1, usize::MAX)?;
    let target = args[0].to_symbolic()?;
    let mut vars: Vec<String> = Vec::new();
    for spec in &args[1..] {
        match spec {
            Value::Int(count) => {
                let Some(last) = vars.last().cloned() else {
                    return Err(ScriptError::Value(
                        "derivative order given without a variable".to_string(),
                    ));
                };
                for _ in 1..*count {
                    vars.push(last.clone());
                }
            }
            Value::Tuple(pair) if pair.len() == 2 => {
                let var = symbol_name(&pair[0])?;
                let count = pair[1].as_int().unwrap_or(1);
                for _ in 0..count {
                    vars.push(var.clone());
                }
            }
            other => vars.push(symbol_name(other)?),
        }
    }
    if vars.is_empty() {
        match implied_symbol(&target, "differentiation")? {
            Some(var) => vars.push(var),
            None => return Ok(Value::Expr(Symbolic::num(0.0))),
        }
    }
    let result = vars.iter().fold(target, |acc, var| acc.diff(var));
    Ok(Value::Expr(result))
}

/// `integrate(expr, x)` or `integrate(expr, (x, a, b))`.
fn integrate(args: &[Value]) -> ScriptResult<Value> {
    check_arity("integrate", args, 1, 2)?;
    let target = args[0].to_symbolic()?;
    let (var, bounds) = match args.get(1) {
        None => match implied_symbol(&target, "integration")? {
            Some(var) => (var, None),
            None => ("x".to_string(), None),
        },
        Some(Value::Tuple(spec)) if spec.len() == 3 => (
            symbol_name(&spec[0])?,
            Some((spec[1].to_symbolic()?, spec[2].to_symbolic()?)),
        ),
        Some(other) => (symbol_name(other)?, None),
    };
    let antiderivative = target
        .integrate(&var)
        .map_err(|_| ScriptError::Unsupported(format!("integrating {target}")))?;
    let Some((lower, upper)) = bounds else {
        return Ok(Value::Expr(antiderivative));
    };
    let symbol = Symbolic::symbol(var);
    Ok(Value::Expr(Symbolic::sub(
        antiderivative.subs(&symbol, &upper),
        antiderivative.subs(&symbol, &lower),
    )))
}

fn evalf(value: &Value) -> ScriptResult<Value> {
    match value {
        Value::Expr(e) if e.is_constant() => Ok(Value::Expr(Symbolic::num(e.eval_constant()))),
        Value::Expr(_) | Value::Rel(_) | Value::Bool(_) => Ok(value.clone()),
        other => Ok(Value::Expr(Symbolic::num(math_number(other, "N")?))),
    }
}

/// Real roots of polynomial equations of degree at most two.
fn solve(args: &[Value]) -> ScriptResult<Value> {
    check_arity("solve", args, 1, 2)?;
    let expr = match &args[0] {
        Value::Rel(r) if r.op == RelOp::Eq => Symbolic::sub(r.lhs.clone(), r.rhs.clone()),
        Value::Bool(true) => return Ok(Value::list(Vec::new())),
        other => other.to_symbolic()?,
    };
    let var = match args.get(1) {
        Some(value) => symbol_name(value)?,
        None => match implied_symbol(&expr, "solve")? {
            Some(var) => var,
            None => return Ok(Value::list(Vec::new())),
        },
    };
    let unsupported = || ScriptError::Unsupported(format!("solving {expr} = 0 for {var}"));
    let first = expr.diff(&var);
    let second = first.diff(&var);
    if second.diff(&var).as_number() != Some(0.0) {
        return Err(unsupported());
    }
    let symbol = Symbolic::symbol(var.clone());
    let zero = Symbolic::num(0.0);
    let a = Symbolic::mul(vec![Symbolic::num(0.5), second]);
    let b = first.subs(&symbol, &zero);
    let c = expr.subs(&symbol, &zero);
    let roots = if a.as_number() == Some(0.0) {
        if b.as_number() == Some(0.0) {
            Vec::new()
        } else {
            vec![Symbolic::div(Symbolic::neg(c), b)]
        }
    } else {
        let discriminant = Symbolic::sub(
            Symbolic::pow(b.clone(), Symbolic::num(2.0)),
            Symbolic::mul(vec![Symbolic::num(4.0), a.clone(), c]),
        );
        let denominator = Symbolic::mul(vec![Symbolic::num(2.0), a]);
        match discriminant.as_number() {
            Some(d) if d < 0.0 => Vec::new(),
            Some(d) if d == 0.0 => vec![Symbolic::div(Symbolic::neg(b), denominator)],
            _ => {
                let root = Symbolic::pow(discriminant, Symbolic::num(0.5));
                let mut roots = vec![
                    Symbolic::div(Symbolic::sub(Symbolic::neg(b.clone()), root.clone()), denominator.clone()),
                    Symbolic::div(Symbolic::add(vec![Symbolic::neg(b), root]), denominator),
                ];
                if roots.iter().all(Symbolic::is_constant) {
                    roots.sort_by(|x, y| x.eval_constant().total_cmp(&y.eval_constant()));
                }
                roots
            }
        }
    };
    Ok(Value::list(roots.into_iter().map(Value::Expr).collect()))
}

/// Two-sided numeric limit; exact when direct substitution is finite.
fn limit(args: &[Value]) -> ScriptResult<Value> {
    check_arity("limit", args, 3, 3)?;
    let expr = args[0].to_symbolic()?;
    let symbol = Symbolic::symbol(symbol_name(&args[1])?);
    let point = args[2].to_symbolic()?;
    if !point.is_constant() {
        return Err(ScriptError::Unsupported("symbolic limit points".to_string()));
    }
    let direct = expr.subs(&symbol, &point);
    if direct.is_constant() && direct.eval_constant().is_finite() {
        return Ok(Value::Expr(direct));
    }
    let at = point.eval_constant();
    let mut estimate = None;
    for step in LIMIT_STEPS {
        let left = expr.subs(&symbol, &Symbolic::num(at - step));
        let right = expr.subs(&symbol, &Symbolic::num(at + step));
        if !left.is_constant() || !right.is_constant() {
            return Err(ScriptError::Unsupported("limits of multivariate expressions".to_string()));
        }
        let (l, r) = (left.eval_constant(), right.eval_constant());
        if l.is_finite() && r.is_finite() && (l - r).abs() <= 1e-4 * l.abs().max(1.0) {
            estimate = Some((l + r) / 2.0);
        }
    }
    estimate
        .map(|v| Value::Expr(Symbolic::num(round_significant(v, 8))))
        .ok_or_else(|| ScriptError::Value(format!("limit of {expr} could not be determined")))
}

const EXPR_METHODS: [&str; 12] = [
    "subs", "diff", "integrate", "simplify", "expand", "doit", "evalf", "n", "factor",
    "trigsimp", "equals", "xreplace",
];
const REL_METHODS: [&str; 4] = ["simplify", "doit", "subs", "expand"];
const LIST_METHODS: [&str; 5] = ["append", "extend", "pop", "index", "count"];
const DICT_METHODS: [&str; 4] = ["get", "keys", "values", "items"];
const STR_METHODS: [&str; 7] = [
    "upper", "lower", "strip", "replace", "startswith", "endswith", "join",
];

/// Attribute lookup on a non-module value.
pub fn get_attribute(value: &Value, attr: &str) -> ScriptResult<Value> {
    let method = |value: &Value| Value::Method(Box::new(value.clone()), attr.into());
    match value {
        Value::Module(module) => module_attr(*module, attr),
        Value::Expr(e) => match attr {
            "free_symbols" => Ok(Value::list(
                e.free_symbols()
                    .into_iter()
                    .map(|s| Value::Expr(Symbolic::symbol(s)))
                    .collect(),
            )),
            "is_zero" => Ok(match e.is_identically_zero() {
                Some(zero) => Value::Bool(zero),
                None => Value::None,
            }),
            "is_number" => Ok(Value::Bool(e.is_constant())),
            a if EXPR_METHODS.contains(&a) => Ok(method(value)),
            _ => Err(missing_attr(value, attr)),
        },
        Value::Rel(r) => match attr {
            "lhs" => Ok(Value::Expr(r.lhs.clone())),
            "rhs" => Ok(Value::Expr(r.rhs.clone())),
            a if REL_METHODS.contains(&a) => Ok(method(value)),
            _ => Err(missing_attr(value, attr)),
        },
        Value::List(_) if LIST_METHODS.contains(&attr) => Ok(method(value)),
        Value::Dict(_) if DICT_METHODS.contains(&attr) => Ok(method(value)),
        Value::Str(_) if STR_METHODS.contains(&attr) => Ok(method(value)),
        _ => Err(missing_attr(value, attr)),
    }
}

fn missing_attr(value: &Value, attr: &str) -> ScriptError {
    ScriptError::Attribute {
        owner: value.type_name().to_string(),
        attr: attr.to_string(),
    }
}

/// Substitution pairs from `subs(old, new)`, `subs({old: new})` or `subs([(old, new)])`.
fn substitutions(args: &[Value]) -> ScriptResult<Vec<(Symbolic, Symbolic)>> {
    let pairs: Vec<(Value, Value)> = match args {
        [old, new] => vec![(old.clone(), new.clone())],
        [Value::Dict(pairs)] => pairs.borrow().clone(),
        [Value::List(_) | Value::Tuple(_)] => args[0]
            .iterate()?
            .into_iter()
            .map(|pair| match pair.iterate()?.as_slice() {
                [old, new] => Ok((old.clone(), new.clone())),
                _ => Err(type_error("subs() pairs must have two elements")),
            })
            .collect::<ScriptResult<_>>()?,
        _ => return Err(type_error("subs() expects (old, new) or a mapping")),
    };
    let mut symbolic = Vec::with_capacity(pairs.len());
    for (old, new) in pairs {
        symbolic.push((old.to_symbolic()?, new.to_symbolic()?));
    }
    Ok(symbolic)
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    match receiver {
        Value::Expr(e) => expr_method(interp, e, receiver, name, args, kwargs),
        Value::Rel(r) => match name {
            "simplify" => Ok(relation_value(r.simplify())),
            "doit" => Ok(receiver.clone()),
            "expand" => call_toolkit(interp, ToolkitFn::Expand, vec![receiver.clone()], kwargs),
            "subs" => {
                let mut current = r.clone();
                for (old, new) in substitutions(&args)? {
                    match current.subs(&old, &new) {
                        Ok(verdict) => return Ok(Value::Bool(verdict)),
                        Err(next) => current = next,
                    }
                }
                Ok(Value::Rel(current))
            }
            _ => Err(missing_attr(receiver, name)),
        },
        Value::List(items) => match name {
            "append" => {
                check_arity(name, &args, 1, 1)?;
                let mut items = items.borrow_mut();
                if items.len() >= 100_000 {
                    return Err(ScriptError::Value("list is too large".to_string()));
                }
                items.extend(args);
                Ok(Value::None)
            }
            "extend" => {
                check_arity(name, &args, 1, 1)?;
                let extra = args[0].iterate()?;
                items.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "pop" => {
                check_arity(name, &args, 0, 1)?;
                let mut items = items.borrow_mut();
                let len = items.len();
                let index = match args.first() {
                    Some(i) => normalize_index(i, len)?,
                    None if len > 0 => len - 1,
                    None => return Err(ScriptError::Index),
                };
                Ok(items.remove(index))
            }
            "index" => {
                check_arity(name, &args, 1, 1)?;
                items
                    .borrow()
                    .iter()
                    .position(|item| values_equal(item, &args[0]))
                    .map(|i| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)))
                    .ok_or_else(|| ScriptError::Value(format!("{} is not in list", args[0].repr())))
            }
            "count" => {
                check_arity(name, &args, 1, 1)?;
                let count = items
                    .borrow()
                    .iter()
                    .filter(|item| values_equal(item, &args[0]))
                    .count();
                Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
            }
            _ => Err(missing_attr(receiver, name)),
        },
        Value::Dict(pairs) => {
            let pairs = pairs.borrow();
            match name {
                "get" => {
                    check_arity(name, &args, 1, 2)?;
                    Ok(pairs
                        .iter()
                        .find(|(k, _)| values_equal(k, &args[0]))
                        .map(|(_, v)| v.clone())
                        .or_else(|| args.get(1).cloned())
                        .unwrap_or(Value::None))
                }
                "keys" => Ok(Value::list(pairs.iter().map(|(k, _)| k.clone()).collect())),
                "values" => Ok(Value::list(pairs.iter().map(|(_, v)| v.clone()).collect())),
                "items" => Ok(Value::list(
                    pairs
                        .iter()
                        .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                        .collect(),
                )),
                _ => Err(missing_attr(receiver, name)),
            }
        }
        Value::Str(s) => str_method(s, name, &args),
        _ => Err(missing_attr(receiver, name)),
    }
}

fn expr_method(
    interp: &mut Interpreter,
    expr: &Symbolic,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    let with_receiver = |args: Vec<Value>| {
        let mut all = vec![receiver.clone()];
        all.extend(args);
        all
    };
    match name {
        "subs" | "xreplace" => {
            let result = substitutions(&args)?
                .iter()
                .fold(expr.clone(), |acc, (old, new)| acc.subs(old, new));
            Ok(Value::Expr(result))
        }
        "diff" => differentiate(&with_receiver(args)),
        "integrate" => integrate(&with_receiver(args)),
        "simplify" | "factor" | "trigsimp" => {
            call_toolkit(interp, ToolkitFn::Simplify, vec![receiver.clone()], kwargs)
        }
        "expand" => call_toolkit(interp, ToolkitFn::Expand, vec![receiver.clone()], kwargs),
        "doit" => Ok(receiver.clone()),
        "evalf" | "n" => evalf(receiver),
        "equals" => {
            check_arity(name, &args, 1, 1)?;
            let difference = Symbolic::sub(expr.clone(), args[0].to_symbolic()?);
            Ok(match difference.is_identically_zero() {
                Some(zero) => Value::Bool(zero),
                None => Value::None,
            })
        }
        _ => Err(missing_attr(receiver, name)),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> ScriptResult<Value> {
    let text_arg = |i: usize| match args.get(i) {
        Some(Value::Str(t)) => Ok(t.to_string()),
        _ => Err(type_error(format!("{name}() expects string arguments"))),
    };
    match name {
        "upper" => Ok(Value::str(s.to_uppercase())),
        "lower" => Ok(Value::str(s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim())),
        "replace" => Ok(Value::str(s.replace(&text_arg(0)?, &text_arg(1)?))),
        "startswith" => Ok(Value::Bool(s.starts_with(&text_arg(0)?))),
        "endswith" => Ok(Value::Bool(s.ends_with(&text_arg(0)?))),
        "join" => {
            check_arity(name, args, 1, 1)?;
            let parts = args[0]
                .iterate()?
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            Ok(Value::str(parts.join(s)))
        }
        _ => Err(ScriptError::Attribute {
            owner: "str".to_string(),
            attr: name.to_string(),
        }),
    }
}

/// Resolve a Python index (negative counts from the end) against `len`.
pub fn normalize_index(index: &Value, len: usize) -> ScriptResult<usize> {
    let raw = index.as_int().ok_or_else(|| {
        type_error(format!(
            "indices must be integers, not '{}'",
            index.type_name()
        ))
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if raw < 0 { raw + len_i } else { raw };
    if resolved < 0 || resolved >= len_i {
        return Err(ScriptError::Index);
    }
    usize::try_from(resolved).map_err(|_| ScriptError::Index)
}
