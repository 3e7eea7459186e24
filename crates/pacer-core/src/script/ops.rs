//! Operator semantics.
//!
//! Integer arithmetic is checked: results that do not fit in an `i64` raise
//! `OverflowError` instead of wrapping.

use std::rc::Rc;

use super::ast::{BinOp, CmpOp, UnaryOp};
use super::error::ErrorKind;
use super::value::{Fault, Outcome, Value, range_len};

/// Longest sequence `*` may produce.
const MAX_REPEAT_LEN: usize = 10_000_000;

/// Deepest list nesting compared element-wise.
const MAX_COMPARE_DEPTH: usize = 100;

enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn overflow() -> Fault {
    Fault::new(ErrorKind::Overflow, "integer overflow")
}

fn unsupported(op: &str, left: &Value, right: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

/// Apply a binary arithmetic operator.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Outcome<Value> {
    match (num(left), num(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => int_binary(op, a, b),
        (Some(a), Some(b)) => {
            let a = match a {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            let b = match b {
                Num::Int(i) => i as f64,
                Num::Float(f) => f,
            };
            float_binary(op, a, b)
        }
        _ => sequence_binary(op, left, right),
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Outcome<Value> {
    let result = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(Fault::new(ErrorKind::ZeroDivision, "division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(Fault::new(
                    ErrorKind::ZeroDivision,
                    "integer division or modulo by zero",
                ));
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Fault::new(ErrorKind::ZeroDivision, "integer modulo by zero"));
            }
            let remainder = a.checked_rem(b).ok_or_else(overflow)?;
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(Fault::new(
                        ErrorKind::ZeroDivision,
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exponent).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(result))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Outcome<Value> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Fault::new(ErrorKind::ZeroDivision, "float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Fault::new(
                    ErrorKind::ZeroDivision,
                    "float floor division by zero",
                ));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Fault::new(ErrorKind::ZeroDivision, "float modulo"));
            }
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Fault::new(
                    ErrorKind::ZeroDivision,
                    "0.0 cannot be raised to a negative power",
                ));
            }
            let result = a.powf(b);
            if result.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(Fault::value_error("math domain error"));
            }
            result
        }
    };
    Ok(Value::Float(result))
}

fn sequence_binary(op: BinOp, left: &Value, right: &Value) -> Outcome<Value> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::Str(Rc::from(joined)))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Mul, Value::Str(_) | Value::List(_), count) if count.as_i64().is_some() => {
            repeat(left, repeat_count(count))
        }
        (BinOp::Mul, count, Value::Str(_) | Value::List(_)) if count.as_i64().is_some() => {
            repeat(right, repeat_count(count))
        }
        _ => Err(unsupported(symbol(op), left, right)),
    }
}

/// Negative counts repeat zero times.
fn repeat_count(count: &Value) -> usize {
    count
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

fn repeat(sequence: &Value, times: usize) -> Outcome<Value> {
    let too_long = || Fault::new(ErrorKind::Overflow, "repeated sequence is too long");
    match sequence {
        Value::Str(s) => {
            if s.len().saturating_mul(times) > MAX_REPEAT_LEN {
                return Err(too_long());
            }
            Ok(Value::str(&s.repeat(times)))
        }
        Value::List(items) => {
            let items = items.borrow();
            if items.len().saturating_mul(times) > MAX_REPEAT_LEN {
                return Err(too_long());
            }
            let mut repeated = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::list(repeated))
        }
        other => Err(Fault::type_error(format!(
            "can't multiply sequence of type '{}'",
            other.type_name()
        ))),
    }
}

/// Apply a unary operator.
pub fn unary(op: UnaryOp, operand: &Value) -> Outcome<Value> {
    match (op, num(operand)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (UnaryOp::Neg | UnaryOp::Pos, None) => Err(Fault::type_error(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            operand.type_name()
        ))),
    }
}

/// Python `==`.
pub fn equals(left: &Value, right: &Value) -> Outcome<bool> {
    equals_within(left, right, 0)
}

fn equals_within(left: &Value, right: &Value, depth: usize) -> Outcome<bool> {
    Ok(match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return Ok(true);
            }
            if depth >= MAX_COMPARE_DEPTH {
                return Err(Fault::new(
                    ErrorKind::Recursion,
                    "maximum recursion depth exceeded in comparison",
                ));
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return Ok(false);
            }
            for (x, y) in a.iter().zip(b.iter()) {
                if !equals_within(x, y, depth + 1)? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Range(a, b, c), Value::Range(x, y, z)) => (a, b, c) == (x, y, z),
        (Value::Image(a), Value::Image(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::Function(a), Value::Function(b)) => std::sync::Arc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Module(a), Value::Module(b)) => a == b,
        _ => match (num(left), num(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
            (Some(_), Some(_)) => left.as_f64() == right.as_f64(),
            _ => false,
        },
    })
}

/// Apply one comparison of a (possibly chained) comparison.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Outcome<bool> {
    match op {
        CmpOp::Eq => equals(left, right),
        CmpOp::Ne => equals(left, right).map(|same| !same),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(left, right).ok_or_else(|| {
                let symbol = match op {
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    _ => ">=",
                };
                Fault::type_error(format!(
                    "'{symbol}' not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            // NaN compares false against everything.
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

/// `None` when the types are not ordered; `Some(None)` for NaN operands.
fn order(left: &Value, right: &Value) -> Option<Option<std::cmp::Ordering>> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(Some(a.cmp(b))),
        _ => match (num(left), num(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Some(Some(a.cmp(&b))),
            (Some(_), Some(_)) => {
                let (a, b) = (left.as_f64()?, right.as_f64()?);
                Some(a.partial_cmp(&b))
            }
            _ => None,
        },
    }
}

fn contains(container: &Value, item: &Value) -> Outcome<bool> {
    match container {
        Value::List(items) => {
            for x in items.borrow().iter() {
                if equals(x, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Range(start, stop, step) => {
            let Some(n) = item.as_i64() else {
                return Ok(false);
            };
            let offset = i128::from(n) - i128::from(*start);
            let step128 = i128::from(*step);
            let in_bounds = if *step > 0 {
                n >= *start && n < *stop
            } else {
                n <= *start && n > *stop
            };
            Ok(in_bounds && offset % step128 == 0 && range_len(*start, *stop, *step) > 0)
        }
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}
