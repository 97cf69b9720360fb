//! Values that cross the proxy boundary.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use crate::object::Object;

/// An opaque handle to an object living in a worker.
///
/// Minted only by transports. Identity is `(epoch, id)`: the same id in another
/// worker generation is a different object.
#[derive(Clone, Debug)]
pub struct RemoteRef {
    id: u64,
    epoch: u64,
    type_str: Arc<str>,
}

impl RemoteRef {
    pub fn new(id: u64, epoch: u64, type_str: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            epoch,
            type_str: type_str.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The worker generation this reference belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The worker's description of the object, e.g. `<mod.PlotItem object at 0x1f40>`.
    pub fn type_str(&self) -> &str {
        &self.type_str
    }
}

impl PartialEq for RemoteRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.epoch == other.epoch
    }
}

impl Eq for RemoteRef {}

impl Hash for RemoteRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.epoch.hash(state);
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_str)
    }
}

/// A value passed to or returned from the worker.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A numeric array, sent by value.
    Array(Vec<f64>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A remote object without a local wrapper.
    Remote(RemoteRef),
    /// A remote object with a local wrapper.
    Object(Object),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Remote(_) => "remote reference",
            Value::Object(_) => "object",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_seq(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// The remote reference behind a bare reference or a wrapped object.
    pub fn remote_ref(&self) -> Option<&RemoteRef> {
        match self {
            Value::Remote(r) => Some(r),
            Value::Object(o) => Some(o.remote()),
            _ => None,
        }
    }

    /// Numbers as a flat `Vec<f64>`, from an array or a sequence of numbers.
    pub fn to_f64s(&self) -> Option<Vec<f64>> {
        match self {
            Value::Array(xs) => Some(xs.clone()),
            Value::List(items) | Value::Tuple(items) => items.iter().map(Value::as_f64).collect(),
            _ => None,
        }
    }

    /// Replaces every wrapped object by its reference, recursively.
    pub fn lower(self) -> Value {
        match self {
            Value::Object(o) => Value::Remote(o.remote().clone()),
            Value::List(items) => Value::List(items.into_iter().map(Value::lower).collect()),
            Value::Tuple(items) => Value::Tuple(items.into_iter().map(Value::lower).collect()),
            Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, v.lower())).collect()),
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Wrapped or not, the same remote object is the same value.
            (a, b) => match (a.remote_ref(), b.remote_ref()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<f64>> for Value {
    fn from(xs: Vec<f64>) -> Self {
        Value::Array(xs)
    }
}

impl From<&[f64]> for Value {
    fn from(xs: &[f64]) -> Self {
        Value::Array(xs.to_vec())
    }
}

impl From<RemoteRef> for Value {
    fn from(r: RemoteRef) -> Self {
        Value::Remote(r)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<&Object> for Value {
    fn from(o: &Object) -> Self {
        Value::Object(o.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}

/// Positional and named arguments of a call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.named.insert(name.into(), value.into());
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Value> {
        &self.named
    }

    pub fn first(&self) -> Option<&Value> {
        self.positional.first()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Looks a parameter up by position, then by name.
    pub fn param(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.named.get(name))
    }

    /// Like [`Args::param`], but treats an explicit `None` as absent.
    pub fn given(&self, index: usize, name: &str) -> Option<&Value> {
        self.param(index, name).filter(|v| !v.is_none())
    }

    /// Removes a named argument.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.named.remove(name)
    }

    /// Moves the named arguments listed in `names` into a new `Args`.
    pub fn split_named(&mut self, names: &[&str]) -> Args {
        let mut taken = Args::new();
        for name in names {
            if let Some(value) = self.named.remove(*name) {
                taken.named.insert((*name).to_string(), value);
            }
        }
        taken
    }

    pub fn into_parts(self) -> (Vec<Value>, BTreeMap<String, Value>) {
        (self.positional, self.named)
    }

    /// Replaces wrapped objects by their references.
    pub fn lower(self) -> Args {
        Args {
            positional: self.positional.into_iter().map(Value::lower).collect(),
            named: self.named.into_iter().map(|(k, v)| (k, v.lower())).collect(),
        }
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: BTreeMap::new(),
        }
    }
}
