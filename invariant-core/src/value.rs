//! The cacheable value universe.
//!
//! [`Value`] is a closed sum over everything the engine may fingerprint,
//! store, or pass between operations. The closure is the float-exclusion
//! guarantee: there is no arm for an IEEE-754 value, so a float cannot reach
//! a cacheable position by construction. Boundaries that accept untyped
//! input (JSON, expressions) reject floats before a `Value` ever exists.
//!
//! Domain types extend the universe through [`DomainType`], a vtable
//! supplying a fully qualified type name, a canonical stream form, and a
//! deterministic stable hash.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;

/// A user-extensible cacheable value.
///
/// Implementors must be immutable: the stable hash and stream form are
/// treated as the value's identity for the lifetime of the process and on
/// disk.
pub trait DomainType: fmt::Debug + Send + Sync {
    /// Fully qualified, stable type name (e.g. `invariant.poly.Polynomial`).
    fn type_name(&self) -> &str;

    /// Deterministic SHA-256 of the value's structural state, 64-hex.
    fn stable_hash(&self) -> String;

    /// Append the canonical stream form to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Expression-visible field access by attribute name.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Structural equality against another domain value.
    fn eq_value(&self, other: &dyn DomainType) -> bool;

    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to a [`DomainType`] value.
#[derive(Clone, Debug)]
pub struct DomainValue(Arc<dyn DomainType>);

impl DomainValue {
    /// Wrap a domain value.
    pub fn new<T: DomainType + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap an already-shared domain value.
    pub fn from_arc(value: Arc<dyn DomainType>) -> Self {
        Self(value)
    }

    /// The fully qualified type name.
    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    /// The type's own stable hash, 64-hex.
    pub fn stable_hash(&self) -> String {
        self.0.stable_hash()
    }

    /// Append the canonical stream form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }

    /// Expression-visible field access.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.0.field(name)
    }

    /// Downcast to a concrete domain type.
    pub fn downcast_ref<T: DomainType + 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for DomainValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_value(other.0.as_ref())
    }
}

/// A member of the closed cacheable value universe.
///
/// Containers recurse; map keys are strings and map identity ignores entry
/// order (the codec sorts them). `Seq` and `Tup` are distinct arms and
/// encode under distinct tags.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// The absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A UTF-8 string.
    Str(String),
    /// An arbitrary-precision decimal with preserved canonical string form.
    Dec(BigDecimal),
    /// An ordered list.
    Seq(Vec<Value>),
    /// An ordered tuple, distinct from `Seq` in the codec.
    Tup(Vec<Value>),
    /// A string-keyed map.
    Map(BTreeMap<String, Value>),
    /// An opaque domain value.
    Domain(DomainValue),
}

impl Value {
    /// Wrap a domain value.
    pub fn domain<T: DomainType + 'static>(value: T) -> Self {
        Value::Domain(DomainValue::new(value))
    }

    /// Short arm name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Str(_) => "Str",
            Value::Dec(_) => "Dec",
            Value::Seq(_) => "Seq",
            Value::Tup(_) => "Tup",
            Value::Map(_) => "Map",
            Value::Domain(_) => "Domain",
        }
    }

    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The map payload, if this is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The element slice, if this is a `Seq` or `Tup`.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) | Value::Tup(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Dec(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}
