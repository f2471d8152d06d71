use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::core::script::ast::{BinOp, FunctionDef};
use crate::core::script::error::{ScriptError, ScriptResult, type_error};
use crate::core::script::expr::{Relation, Symbolic};
use crate::core::script::toolkit::ToolkitFn;

const MAX_SEQUENCE_LEN: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Sympy,
    Math,
}

impl Module {
    pub fn name(self) -> &'static str {
        match self {
            Module::Sympy => "sympy",
            Module::Math => "math",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Bool,
    Int,
    Float,
    Str,
    Abs,
    Round,
    Min,
    Max,
    Len,
    Range,
    All,
    Any,
    Sum,
    List,
    Tuple,
    Print,
    Isinstance,
    Enumerate,
    Zip,
}

impl Builtin {
    pub const ALL: [Builtin; 19] = [
        Builtin::Bool,
        Builtin::Int,
        Builtin::Float,
        Builtin::Str,
        Builtin::Abs,
        Builtin::Round,
        Builtin::Min,
        Builtin::Max,
        Builtin::Len,
        Builtin::Range,
        Builtin::All,
        Builtin::Any,
        Builtin::Sum,
        Builtin::List,
        Builtin::Tuple,
        Builtin::Print,
        Builtin::Isinstance,
        Builtin::Enumerate,
        Builtin::Zip,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Bool => "bool",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::All => "all",
            Builtin::Any => "any",
            Builtin::Sum => "sum",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Print => "print",
            Builtin::Isinstance => "isinstance",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
        }
    }
}

/// A `def` together with its defaults, evaluated when the `def` ran.
#[derive(Debug)]
pub struct UserFunction {
    pub def: Rc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
}

/// Runtime value of the script interpreter.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Expr(Symbolic),
    Rel(Relation),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Module(Module),
    Builtin(Builtin),
    Toolkit(ToolkitFn),
    Method(Box<Value>, Rc<str>),
    Function(Rc<UserFunction>),
}

impl Value {
    pub fn str(text: impl Into<Rc<str>>) -> Self {
        Value::Str(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Expr(_) => "Expr",
            Value::Rel(_) => "Relational",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Module(_) => "module",
            Value::Builtin(_) | Value::Toolkit(_) => "builtin_function_or_method",
            Value::Method(..) => "method",
            Value::Function(_) => "function",
        }
    }

    /// Python truthiness. Unresolved relations have no truth value.
    pub fn truthy(&self) -> ScriptResult<bool> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Expr(e) => match e.as_number() {
                Some(v) => v != 0.0,
                None => true,
            },
            Value::Rel(_) => {
                return Err(type_error("cannot determine truth value of Relational"));
            }
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.borrow().is_empty(),
            Value::Module(_)
            | Value::Builtin(_)
            | Value::Toolkit(_)
            | Value::Method(..)
            | Value::Function(_) => true,
        })
    }

    /// Numeric view for plain Python numbers (bools count as ints).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Expr(_))
    }

    /// Convert to a symbolic expression (numbers become constants).
    pub fn to_symbolic(&self) -> ScriptResult<Symbolic> {
        match self {
            Value::Expr(e) => Ok(e.clone()),
            other => other.as_f64().map(Symbolic::num).ok_or_else(|| {
                type_error(format!(
                    "cannot convert '{}' to a symbolic expression",
                    other.type_name()
                ))
            }),
        }
    }

    /// Elements of an iterable, materialized.
    pub fn iterate(&self) -> ScriptResult<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Dict(pairs) => Ok(pairs.borrow().iter().map(|(k, _)| k.clone()).collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// `repr()` rendering used inside containers.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

/// `str()` rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Expr(e) => write!(f, "{e}"),
            Value::Rel(r) => write!(f, "{r}"),
            Value::List(items) => {
                let items = items.borrow();
                write!(f, "[{}]", join_repr(&items))
            }
            Value::Tuple(items) => {
                if items.len() == 1 {
                    write!(f, "({},)", items[0].repr())
                } else {
                    write!(f, "({})", join_repr(items))
                }
            }
            Value::Dict(pairs) => {
                let pairs = pairs.borrow();
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Toolkit(t) => write!(f, "<function {}>", t.name()),
            Value::Method(_, name) => write!(f, "<bound method {name}>"),
            Value::Function(function) => write!(f, "<function {}>", function.def.name),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

/// Python `==` semantics, with symbolic expressions compared structurally.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Expr(_), _) | (_, Value::Expr(_)) => match (a.to_symbolic(), b.to_symbolic()) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
        (Value::Rel(x), Value::Rel(y)) => x == y,
        (Value::List(x), Value::List(y)) => sequences_equal(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => sequences_equal(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.iter()
                        .any(|(k2, v2)| values_equal(k, k2) && values_equal(v, v2))
                })
        }
        (Value::Module(x), Value::Module(y)) => x == y,
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Toolkit(x), Value::Toolkit(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn sequences_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Python `is`: identity for containers, value identity for singletons.
pub fn values_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

/// Apply an arithmetic operator with Python numeric promotion.
pub fn binary_op(op: BinOp, a: &Value, b: &Value) -> ScriptResult<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return int_op(op, x, y);
    }
    if a.is_symbolic() || b.is_symbolic() {
        return symbolic_op(op, a, b);
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return float_op(op, x, y).map(Value::Float);
    }
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => Ok(Value::str(format!("{x}{y}"))),
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let count = repeat_count(n, s.len())?;
            Ok(Value::str(s.repeat(count)))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            let mut items = x.as_ref().clone();
            items.extend(y.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            let items = items.borrow();
            let count = repeat_count(n, items.len())?;
            Ok(Value::list(
                std::iter::repeat_n(items.iter().cloned(), count)
                    .flatten()
                    .collect(),
            ))
        }
        _ => Err(type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn repeat_count(n: &Value, unit: usize) -> ScriptResult<usize> {
    let count = usize::try_from(n.as_int().unwrap_or(0).max(0)).unwrap_or(0);
    if count.saturating_mul(unit.max(1)) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::Value("sequence repetition is too large".to_string()));
    }
    Ok(count)
}

fn int_op(op: BinOp, x: i64, y: i64) -> ScriptResult<Value> {
    let promoted = || float_op(op, x as f64, y as f64).map(Value::Float);
    match op {
        BinOp::Add => x.checked_add(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinOp::Sub => x.checked_sub(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinOp::Mul => x.checked_mul(y).map_or_else(promoted, |v| Ok(Value::Int(v))),
        BinOp::Div => float_op(op, x as f64, y as f64).map(Value::Float),
        BinOp::FloorDiv | BinOp::Mod => {
            if y == 0 {
                return Err(ScriptError::ZeroDivision);
            }
            let (Some(quotient), Some(remainder)) = (x.checked_div_euclid(y), x.checked_rem_euclid(y))
            else {
                return promoted();
            };
            // Python rounds toward negative infinity; adjust for negative divisors.
            let (quotient, remainder) = if y < 0 && remainder != 0 {
                (quotient - 1, remainder + y)
            } else {
                (quotient, remainder)
            };
            Ok(Value::Int(if op == BinOp::FloorDiv {
                quotient
            } else {
                remainder
            }))
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(ScriptError::ZeroDivision);
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            u32::try_from(y)
                .ok()
                .and_then(|exp| x.checked_pow(exp))
                .map_or_else(promoted, |v| Ok(Value::Int(v)))
        }
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> ScriptResult<f64> {
    match op {
        BinOp::Add => Ok(x + y),
        BinOp::Sub => Ok(x - y),
        BinOp::Mul => Ok(x * y),
        BinOp::Div => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            Ok(x / y)
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            Ok((x / y).floor())
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            Ok(x - y * (x / y).floor())
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(ScriptError::ZeroDivision);
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(ScriptError::Value(
                    "complex results are not supported".to_string(),
                ));
            }
            Ok(x.powf(y))
        }
    }
}

fn symbolic_op(op: BinOp, a: &Value, b: &Value) -> ScriptResult<Value> {
    let (x, y) = match (a.to_symbolic(), b.to_symbolic()) {
        (Ok(x), Ok(y)) => (x, y),
        _ => {
            return Err(type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                a.type_name(),
                b.type_name()
            )));
        }
    };
    let result = match op {
        BinOp::Add => Symbolic::add(vec![x, y]),
        BinOp::Sub => Symbolic::sub(x, y),
        BinOp::Mul => Symbolic::mul(vec![x, y]),
        BinOp::Div => {
            if y.as_number() == Some(0.0) {
                return Err(ScriptError::ZeroDivision);
            }
            Symbolic::div(x, y)
        }
        BinOp::Pow => Symbolic::pow(x, y),
        BinOp::FloorDiv | BinOp::Mod => {
            return Err(ScriptError::Unsupported(format!(
                "'{}' on symbolic expressions",
                op.symbol()
            )));
        }
    };
    Ok(Value::Expr(result))
}
