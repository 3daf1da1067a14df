//! Provides a dynamic value type abstraction.
//!
//! Every expression inside a directive evaluates to a [`Value`].  Values are
//! what render calls receive as input, what bindings of a
//! [`Mold`](crate::Mold) hold and what custom commands accept and return.
//!
//! # Basic Value Conversions
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use mold::value::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let true_value = Value::from(true);
//! let list_value = Value::from(vec![1, 2, 3]);
//! ```
//!
//! Or via the [`FromIterator`] trait:
//!
//! ```
//! # use mold::value::Value;
//! // collection into a sequence
//! let value: Value = (1..10).collect();
//!
//! // collection into a map
//! let value: Value = [("key", "value")].into_iter().collect();
//! ```
//!
//! # Serde Conversions
//!
//! Anything that implements [`Serialize`](serde::Serialize) can be turned
//! into a value with [`Value::from_serialize`].  Maps keep the order of their
//! keys, which is the order in which `<<for k, v in ...>>` visits them.
//!
//! ```
//! # use mold::value::Value;
//! # use std::collections::BTreeMap;
//! let mut m = BTreeMap::new();
//! m.insert("x", 10);
//! let value = Value::from_serialize(&m).unwrap();
//! ```
//!
//! # Undefined
//!
//! The special [`Undefined`](Value::UNDEFINED) value is produced when a name
//! or attribute cannot be found.  It renders as empty string and is falsy.
//! How strictly it is treated is controlled by
//! [`UndefinedBehavior`](crate::UndefinedBehavior).
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::vm::State;

pub(crate) mod ops;

/// The map type used by map values.
///
/// Keys are always strings and iteration follows insertion order.
pub type ValueMap = IndexMap<String, Value>;

type FunctionFn = dyn Fn(&State, &[Value]) -> Result<Value, Error> + Sync + Send + 'static;

/// Describes the kind of value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined
    Undefined,
    /// The value is the none singleton (`null`)
    None,
    /// The value is a [`bool`]
    Bool,
    /// The value is a number of a supported type.
    Number,
    /// The value is a string.
    String,
    /// The value is a sequence of other values.
    Seq,
    /// The value is a key/value mapping.
    Map,
    /// The value can be called.
    Function,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Function => "function",
        })
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined,
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Function(Arc<FunctionFn>),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::Undefined => f.write_str("undefined"),
            ValueRepr::None => f.write_str("null"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::String(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Function(_) => f.write_str("<function>"),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl Default for Value {
    fn default() -> Value {
        Value::UNDEFINED
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Undefined => Ok(()),
            ValueRepr::None => f.write_str("null"),
            ValueRepr::Bool(val) => fmt::Display::fmt(val, f),
            ValueRepr::I64(val) => fmt::Display::fmt(val, f),
            ValueRepr::F64(val) => {
                if val.is_nan() {
                    f.write_str("NaN")
                } else if val.is_infinite() {
                    let sign = if val.is_sign_negative() { "-" } else { "" };
                    write!(f, "{sign}Infinity")
                } else if val.fract() == 0.0 && val.abs() < 1e15 {
                    write!(f, "{}", *val as i64)
                } else {
                    fmt::Display::fmt(val, f)
                }
            }
            ValueRepr::String(val) => f.write_str(val),
            ValueRepr::Seq(values) => {
                ok!(f.write_str("["));
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{value:?}"));
                }
                f.write_str("]")
            }
            ValueRepr::Map(map) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{key:?}: {value:?}"));
                }
                f.write_str("}")
            }
            ValueRepr::Function(_) => f.write_str("<function>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::strict_eq(self, other)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        ops::compare(self, other).ok().flatten()
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None | ValueRepr::Function(_) => {
                serializer.serialize_unit()
            }
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::String(ref s) => serializer.serialize_str(s),
            ValueRepr::Seq(ref items) => {
                let mut seq = ok!(serializer.serialize_seq(Some(items.len())));
                for item in items.iter() {
                    ok!(seq.serialize_element(item));
                }
                seq.end()
            }
            ValueRepr::Map(ref entries) => {
                let mut map = ok!(serializer.serialize_map(Some(entries.len())));
                for (key, value) in entries.iter() {
                    ok!(map.serialize_entry(key, value));
                }
                map.end()
            }
        }
    }
}

impl Value {
    /// The undefined value.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined);

    /// Creates a value from something that can be serialized.
    ///
    /// The conversion goes through [`serde_json::Value`] so anything that
    /// serializes to JSON can be used.  Integers that do not fit into an
    /// `i64` become floats.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
        serde_json::to_value(value).map(Value::from).map_err(|err| {
            Error::new(ErrorKind::BadSerialization, "unable to convert value").with_source(err)
        })
    }

    /// Creates a callable value from a function.
    ///
    /// Functions can be placed in the bindings of a [`Mold`](crate::Mold) or
    /// in the render input and are invoked with call syntax (`f(1, 2)`)
    /// from expressions.
    ///
    /// ```
    /// # use mold::{Mold, context, value::Value};
    /// let mold = Mold::with_bindings(context! {
    ///     double => Value::from_function(|_state, args: &[Value]| {
    ///         Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
    ///     }),
    /// });
    /// let r = mold.bake("<<t double(21)>>").unwrap();
    /// assert_eq!(r.render(()).unwrap(), "42");
    /// ```
    pub fn from_function<F>(f: F) -> Value
    where
        F: Fn(&State, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value(ValueRepr::Function(Arc::new(f)))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined => ValueKind::Undefined,
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
            ValueRepr::Function(_) => ValueKind::Function,
        }
    }

    /// Is this value undefined?
    pub fn is_undefined(&self) -> bool {
        matches!(self.0, ValueRepr::Undefined)
    }

    /// Is this value none?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Is this value considered true?
    ///
    /// Undefined, none, `false`, zero, NaN, the empty string and empty
    /// sequences or maps are false.  Everything else is true.
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Undefined | ValueRepr::None => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::I64(val) => val != 0,
            ValueRepr::F64(val) => val != 0.0 && !val.is_nan(),
            ValueRepr::String(ref s) => !s.is_empty(),
            ValueRepr::Seq(ref items) => !items.is_empty(),
            ValueRepr::Map(ref map) => !map.is_empty(),
            ValueRepr::Function(_) => true,
        }
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer (or a float without fractional part)
    /// returns it as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val),
            ValueRepr::F64(val) if val.fract() == 0.0 && val.abs() < i64::MAX as f64 => {
                Some(val as i64)
            }
            _ => None,
        }
    }

    /// If the value is a number returns it as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a sequence, returns its items.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self.0 {
            ValueRepr::Seq(ref items) => Some(&items[..]),
            _ => None,
        }
    }

    /// If the value is a map, returns it.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map) => Some(map),
            _ => None,
        }
    }

    /// Returns the length of strings, sequences and maps.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s) => Some(s.chars().count()),
            ValueRepr::Seq(ref items) => Some(items.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            _ => None,
        }
    }

    /// Looks up an attribute by name.
    ///
    /// Maps resolve their keys, strings and sequences know `length`.  Missing
    /// attributes return `None` so that the caller can apply its undefined
    /// behavior.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map) => map.get(name).cloned(),
            ValueRepr::String(_) | ValueRepr::Seq(_) if name == "length" => {
                self.len().map(|len| Value::from(len as i64))
            }
            _ => None,
        }
    }

    /// Looks up an item by key or index.
    pub fn get_item(&self, key: &Value) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map) => match key.0 {
                ValueRepr::String(ref s) => map.get(&s[..]).cloned(),
                ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Bool(_) => {
                    map.get(&key.to_string()).cloned()
                }
                _ => None,
            },
            ValueRepr::Seq(ref items) => {
                let idx = some!(key.as_i64());
                items.get(some!(usize::try_from(idx).ok())).cloned()
            }
            ValueRepr::String(ref s) => match key.0 {
                ValueRepr::String(ref name) => self.get_attr(name),
                _ => {
                    let idx = some!(usize::try_from(some!(key.as_i64())).ok());
                    s.chars().nth(idx).map(Value::from)
                }
            },
            _ => None,
        }
    }

    /// Calls the value if it's a function.
    pub fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        match self.0 {
            ValueRepr::Function(ref f) => f(state, args),
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("value of type {} is not callable", self.kind()),
            )),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Value {
        Value(ValueRepr::None)
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Value {
        Value(ValueRepr::Bool(val))
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(val: $ty) -> Value {
                    Value(ValueRepr::I64(val as i64))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(val: u64) -> Value {
        match i64::try_from(val) {
            Ok(val) => Value(ValueRepr::I64(val)),
            Err(_) => Value(ValueRepr::F64(val as f64)),
        }
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Value {
        Value::from(val as u64)
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Value {
        Value(ValueRepr::F64(val as f64))
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Value {
        Value(ValueRepr::F64(val))
    }
}

impl From<char> for Value {
    fn from(val: char) -> Value {
        Value::from(val.to_string())
    }
}

impl<'a> From<&'a str> for Value {
    fn from(val: &'a str) -> Value {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<String> for Value {
    fn from(val: String) -> Value {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl<'a> From<&'a String> for Value {
    fn from(val: &'a String) -> Value {
        Value::from(val.as_str())
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Value {
        Value(ValueRepr::String(val))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Value {
        val.into_iter().collect()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Value {
        match val {
            Some(val) => val.into(),
            None => Value::from(()),
        }
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(val)))
    }
}

impl From<serde_json::Value> for Value {
    fn from(val: serde_json::Value) -> Value {
        match val {
            serde_json::Value::Null => Value::from(()),
            serde_json::Value::Bool(b) => Value::from(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else {
                    Value::from(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => items.into_iter().collect(),
            serde_json::Value::Object(map) => map.into_iter().collect(),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        let items: Vec<Value> = iter.into_iter().map(Into::into).collect();
        Value(ValueRepr::Seq(Arc::new(items)))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map: ValueMap = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::from(map)
    }
}
