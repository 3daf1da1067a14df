use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueKind, ValueRepr};

pub enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn as_i64(value: &Value) -> Option<i64> {
    match value.0 {
        ValueRepr::I64(x) => Some(x),
        ValueRepr::Bool(x) => Some(x as i64),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value.0 {
        ValueRepr::I64(x) => Some(x as f64),
        ValueRepr::Bool(x) => Some(x as i64 as f64),
        ValueRepr::F64(x) => Some(x),
        _ => None,
    }
}

/// Coerces two values into a common numeric representation.
///
/// Bools take part in arithmetic as `0` and `1`.
pub fn coerce(a: &Value, b: &Value) -> Option<CoerceResult> {
    match (as_i64(a), as_i64(b)) {
        (Some(a), Some(b)) => Some(CoerceResult::I64(a, b)),
        _ => Some(CoerceResult::F64(some!(as_f64(a)), some!(as_f64(b)))),
    }
}

fn failed_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!(
            "tried to use {} operator on unsupported types {} and {}",
            op,
            lhs.kind(),
            rhs.kind()
        ),
    )
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => match a.$int(b) {
                    Some(val) => Ok(Value::from(val)),
                    None => Ok(Value::from(a as f64 $float b as f64)),
                },
                Some(CoerceResult::F64(a, b)) => Ok(Value::from(a $float b)),
                None => Err(failed_op(stringify!($float), lhs, rhs)),
            }
        }
    };
}

math_binop!(sub, checked_sub, -);
math_binop!(mul, checked_mul, *);

/// Adds two values.
///
/// If either side is a string both sides are stringified and concatenated.
/// Two sequences are joined.
pub fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(_), _) | (_, ValueRepr::String(_)) => {
            Ok(Value::from(format!("{lhs}{rhs}")))
        }
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            Ok(a.iter().chain(b.iter()).cloned().collect::<Value>())
        }
        _ => match coerce(lhs, rhs) {
            Some(CoerceResult::I64(a, b)) => match a.checked_add(b) {
                Some(val) => Ok(Value::from(val)),
                None => Ok(Value::from(a as f64 + b as f64)),
            },
            Some(CoerceResult::F64(a, b)) => Ok(Value::from(a + b)),
            None => Err(failed_op("+", lhs, rhs)),
        },
    }
}

/// Divides two numbers.  Division always produces a float.
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => Ok(Value::from(a as f64 / b as f64)),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a / b)),
        None => Err(failed_op("/", lhs, rhs)),
    }
}

pub fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(Error::new(
            ErrorKind::InvalidOperation,
            "remainder by zero",
        )),
        Some(CoerceResult::I64(a, b)) => Ok(Value::from(a.wrapping_rem(b))),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from(a % b)),
        None => Err(failed_op("%", lhs, rhs)),
    }
}

pub fn neg(val: &Value) -> Result<Value, Error> {
    match val.0 {
        ValueRepr::I64(x) => Ok(match x.checked_neg() {
            Some(x) => Value::from(x),
            None => Value::from(-(x as f64)),
        }),
        ValueRepr::F64(x) => Ok(Value::from(-x)),
        ValueRepr::Bool(x) => Ok(Value::from(-(x as i64))),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot negate value of type {}", val.kind()),
        )),
    }
}

/// Converts a value to a number (unary `+`).
///
/// Strings are parsed, none becomes zero and everything that cannot be
/// converted becomes NaN.
pub fn pos(val: &Value) -> Value {
    match val.0 {
        ValueRepr::I64(_) | ValueRepr::F64(_) => val.clone(),
        ValueRepr::Bool(x) => Value::from(x as i64),
        ValueRepr::None => Value::from(0),
        ValueRepr::String(ref s) => {
            let s = s.trim();
            if s.is_empty() {
                Value::from(0)
            } else if let Ok(int) = s.parse::<i64>() {
                Value::from(int)
            } else {
                Value::from(s.parse::<f64>().unwrap_or(f64::NAN))
            }
        }
        _ => Value::from(f64::NAN),
    }
}

/// Strict equality (`===`).
///
/// Values are equal if they are of the same kind and have the same
/// contents.  Integers and floats are both numbers and compare by value.
pub fn strict_eq(lhs: &Value, rhs: &Value) -> bool {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::Undefined, ValueRepr::Undefined) => true,
        (ValueRepr::None, ValueRepr::None) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::I64(a), ValueRepr::I64(b)) => a == b,
        (ValueRepr::I64(_) | ValueRepr::F64(_), ValueRepr::I64(_) | ValueRepr::F64(_)) => {
            as_f64(lhs) == as_f64(rhs)
        }
        (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            Arc::ptr_eq(a, b)
                || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| strict_eq(a, b)))
        }
        (ValueRepr::Map(a), ValueRepr::Map(b)) => {
            Arc::ptr_eq(a, b)
                || (a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.get(key).map_or(false, |other| strict_eq(value, other))
                    }))
        }
        (ValueRepr::Function(a), ValueRepr::Function(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Loose equality (`==`).
///
/// Like [`strict_eq`] but undefined and none are equal to each other.
pub fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.kind(), rhs.kind()) {
        (ValueKind::Undefined | ValueKind::None, ValueKind::Undefined | ValueKind::None) => true,
        _ => strict_eq(lhs, rhs),
    }
}

/// Orders two values.
///
/// Numbers and strings can be ordered.  `Ok(None)` means the values are of
/// orderable kinds but unordered (NaN).
pub fn compare(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(a), ValueRepr::String(b)) => Ok(Some(a.cmp(b))),
        _ => match coerce(lhs, rhs) {
            Some(CoerceResult::I64(a, b)) => Ok(Some(a.cmp(&b))),
            Some(CoerceResult::F64(a, b)) => Ok(a.partial_cmp(&b)),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot compare {} and {}", lhs.kind(), rhs.kind()),
            )),
        },
    }
}
