//! Python builtins available to verification scripts.

use std::cmp::Ordering;

use crate::core::script::ast::BinOp;
use crate::core::script::error::{ScriptError, ScriptResult, type_error};
use crate::core::script::expr::{Func, Symbolic};
use crate::core::script::interp::Interpreter;
use crate::core::script::value::{Builtin, Value, binary_op};

const MAX_RANGE_LEN: i64 = 100_000;

pub(crate) fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(type_error(format!(
            "{name}() takes {expected} argument(s) but {} were given",
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn kwarg<'a>(kwargs: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> ScriptResult<()> {
    match kwargs.first() {
        Some((key, _)) => Err(type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

/// Numeric value used for ordering; constant expressions count as numbers.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Expr(e) if e.is_constant() => Some(e.eval_constant()),
        other => other.as_f64(),
    }
}

fn order(a: &Value, b: &Value) -> ScriptResult<Ordering> {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .ok_or_else(|| ScriptError::Value("cannot order NaN values".to_string())),
        _ => Err(type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn call_builtin(
    interp: &mut Interpreter,
    builtin: Builtin,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let sep = match kwarg(&kwargs, "sep") {
                Some(Value::Str(s)) => s.to_string(),
                _ => " ".to_string(),
            };
            let line = args
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(&sep);
            interp.print(line);
            return Ok(Value::None);
        }
        Builtin::Sum | Builtin::Enumerate => {}
        _ => no_kwargs(name, &kwargs)?,
    }
    match builtin {
        Builtin::Bool => {
            check_arity(name, &args, 0, 1)?;
            match args.first() {
                Some(value) => Ok(Value::Bool(value.truthy()?)),
                None => Ok(Value::Bool(false)),
            }
        }
        Builtin::Int => {
            check_arity(name, &args, 0, 1)?;
            let Some(value) = args.first() else {
                return Ok(Value::Int(0));
            };
            to_int(value).map(Value::Int)
        }
        Builtin::Float => {
            check_arity(name, &args, 0, 1)?;
            let Some(value) = args.first() else {
                return Ok(Value::Float(0.0));
            };
            to_float(value).map(Value::Float)
        }
        Builtin::Str => {
            check_arity(name, &args, 0, 1)?;
            Ok(Value::str(
                args.first().map(ToString::to_string).unwrap_or_default(),
            ))
        }
        Builtin::Abs => {
            check_arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(i
                    .checked_abs()
                    .map_or(Value::Float((*i as f64).abs()), Value::Int)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Expr(e) => Ok(Value::Expr(Symbolic::func(Func::Abs, e.clone()))),
                other => Err(type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Round => {
            check_arity(name, &args, 1, 2)?;
            let value = numeric(&args[0]).ok_or_else(|| {
                type_error(format!(
                    "type {} doesn't define __round__ method",
                    args[0].type_name()
                ))
            })?;
            match args.get(1) {
                None | Some(Value::None) => {
                    let rounded = value.round_ties_even();
                    if !rounded.is_finite() {
                        return Err(ScriptError::Value(
                            "cannot convert float infinity or NaN to integer".to_string(),
                        ));
                    }
                    Ok(Value::Int(rounded as i64))
                }
                Some(digits) => {
                    let digits = digits
                        .as_int()
                        .ok_or_else(|| type_error("round() digits must be an integer"))?;
                    let factor = 10f64.powi(i32::try_from(digits.clamp(-300, 300)).unwrap_or(0));
                    let rounded = (value * factor).round_ties_even() / factor;
                    if matches!(args[0], Value::Int(_) | Value::Bool(_)) {
                        Ok(Value::Int(rounded as i64))
                    } else {
                        Ok(Value::Float(rounded))
                    }
                }
            }
        }
        Builtin::Min | Builtin::Max => {
            let items = if args.len() == 1 {
                args[0].iterate()?
            } else {
                args
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let ordering = order(&item, &current)?;
                        let better = if builtin == Builtin::Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        };
                        if better { item } else { current }
                    }
                });
            }
            best.ok_or_else(|| ScriptError::Value(format!("{name}() arg is an empty sequence")))
        }
        Builtin::Len => {
            check_arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::List(items) => items.borrow().len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(pairs) => pairs.borrow().len(),
                Value::Str(s) => s.chars().count(),
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        Builtin::Range => {
            check_arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|a| {
                    a.as_int().ok_or_else(|| {
                        type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            a.type_name()
                        ))
                    })
                })
                .collect::<ScriptResult<Vec<i64>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(type_error("range expected at most 3 arguments")),
            };
            if step == 0 {
                return Err(ScriptError::Value(
                    "range() arg 3 must not be zero".to_string(),
                ));
            }
            let span = if step > 0 {
                stop.saturating_sub(start)
            } else {
                start.saturating_sub(stop)
            };
            let stride = step.saturating_abs();
            let count = if span <= 0 {
                0
            } else {
                span / stride + i64::from(span % stride != 0)
            };
            if count > MAX_RANGE_LEN {
                return Err(ScriptError::Value(format!(
                    "range of {count} elements exceeds the sandbox limit"
                )));
            }
            Ok(Value::list(
                (0..count).map(|i| Value::Int(start + i * step)).collect(),
            ))
        }
        Builtin::All | Builtin::Any => {
            check_arity(name, &args, 1, 1)?;
            let want = builtin == Builtin::Any;
            for item in args[0].iterate()? {
                if item.truthy()? == want {
                    return Ok(Value::Bool(want));
                }
            }
            Ok(Value::Bool(!want))
        }
        Builtin::Sum => {
            check_arity(name, &args, 1, 2)?;
            let mut total = args
                .get(1)
                .or_else(|| kwarg(&kwargs, "start"))
                .cloned()
                .unwrap_or(Value::Int(0));
            for item in args[0].iterate()? {
                interp.tick()?;
                total = binary_op(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::List => {
            check_arity(name, &args, 0, 1)?;
            match args.first() {
                Some(value) => Ok(Value::list(value.iterate()?)),
                None => Ok(Value::list(Vec::new())),
            }
        }
        Builtin::Tuple => {
            check_arity(name, &args, 0, 1)?;
            match args.first() {
                Some(value) => Ok(Value::tuple(value.iterate()?)),
                None => Ok(Value::tuple(Vec::new())),
            }
        }
        Builtin::Isinstance => {
            check_arity(name, &args, 2, 2)?;
            let kinds = match &args[1] {
                Value::Tuple(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            let mut matched = false;
            for kind in kinds {
                let Value::Builtin(kind) = kind else {
                    return Err(type_error(
                        "isinstance() arg 2 must be a type or tuple of types",
                    ));
                };
                matched |= matches!(
                    (kind, &args[0]),
                    (Builtin::Int, Value::Int(_) | Value::Bool(_))
                        | (Builtin::Bool, Value::Bool(_))
                        | (Builtin::Float, Value::Float(_))
                        | (Builtin::Str, Value::Str(_))
                        | (Builtin::List, Value::List(_))
                        | (Builtin::Tuple, Value::Tuple(_))
                );
            }
            Ok(Value::Bool(matched))
        }
        Builtin::Enumerate => {
            check_arity(name, &args, 1, 2)?;
            let start = args
                .get(1)
                .or_else(|| kwarg(&kwargs, "start"))
                .and_then(Value::as_int)
                .unwrap_or(0);
            Ok(Value::list(
                args[0]
                    .iterate()?
                    .into_iter()
                    .zip(start..)
                    .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
                    .collect(),
            ))
        }
        Builtin::Zip => {
            let columns = args
                .iter()
                .map(Value::iterate)
                .collect::<ScriptResult<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::list(
                (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            ))
        }
        Builtin::Print => Ok(Value::None),
    }
}

fn to_int(value: &Value) -> ScriptResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Str(s) => s.trim().parse().map_err(|_| {
            ScriptError::Value(format!("invalid literal for int() with base 10: '{s}'"))
        }),
        other => {
            let v = to_float(other)?;
            if !v.is_finite() {
                return Err(ScriptError::Value(
                    "cannot convert float infinity or NaN to integer".to_string(),
                ));
            }
            Ok(v.trunc() as i64)
        }
    }
}

fn to_float(value: &Value) -> ScriptResult<f64> {
    match value {
        Value::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| ScriptError::Value(format!("could not convert string to float: '{s}'"))),
        Value::Expr(e) if !e.is_constant() => {
            Err(type_error("Cannot convert expression to float"))
        }
        other => numeric(other).ok_or_else(|| {
            type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}
