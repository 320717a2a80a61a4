//! The dynamic value model.

use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::list::TrackedList;
use super::map::TrackedMap;
use super::raw::{List, Map, Record, Set};
use super::record::TrackedRecord;
use super::set::TrackedSet;
use super::tracked::Tracked;
use crate::reactive::{Key, TargetId};

/// A value stored in tracked state.
///
/// Primitives are plain data. Composites (`Record`, `List`, `Map`, `Set`) are
/// shared handles with identity; `Tracked` is the instrumented view over a
/// composite returned by [`wrap`](super::wrap).
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Record(Record),
    List(List),
    Map(Map),
    Set(Set),
    Tracked(Tracked),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The tracked record view, if this is one.
    pub fn as_record(&self) -> Option<TrackedRecord> {
        match self {
            Value::Tracked(Tracked::Record(record)) => Some(record.clone()),
            _ => None,
        }
    }

    /// The tracked list view, if this is one.
    pub fn as_list(&self) -> Option<TrackedList> {
        match self {
            Value::Tracked(Tracked::List(list)) => Some(list.clone()),
            _ => None,
        }
    }

    /// The tracked map view, if this is one.
    pub fn as_map(&self) -> Option<TrackedMap> {
        match self {
            Value::Tracked(Tracked::Map(map)) => Some(map.clone()),
            _ => None,
        }
    }

    /// The tracked set view, if this is one.
    pub fn as_set(&self) -> Option<TrackedSet> {
        match self {
            Value::Tracked(Tracked::Set(set)) => Some(set.clone()),
            _ => None,
        }
    }

    /// Whether this is a composite, raw or tracked.
    pub fn is_composite(&self) -> bool {
        self.target_id().is_some()
    }

    /// Identity of the underlying composite.
    pub fn target_id(&self) -> Option<TargetId> {
        match self {
            Value::Record(record) => Some(record.id()),
            Value::List(list) => Some(list.id()),
            Value::Map(map) => Some(map.id()),
            Value::Set(set) => Some(set.id()),
            Value::Tracked(tracked) => Some(tracked.target_id()),
            _ => None,
        }
    }

    /// Same-value comparison used to decide whether a write changes state.
    ///
    /// Composites compare by identity, so a raw handle and its tracked view
    /// are the same value. Floats compare bitwise after treating every NaN
    /// as equal: `NaN` is a no-op overwrite of `NaN`, while `0.0` and `-0.0`
    /// differ.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.target_id(), other.target_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
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

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<Set> for Value {
    fn from(set: Set) -> Self {
        Value::Set(set)
    }
}

impl From<Tracked> for Value {
    fn from(tracked: Tracked) -> Self {
        Value::Tracked(tracked)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Serializes an untracked snapshot. Cyclic values are not supported.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Record(record) => record.serialize(serializer),
            Value::List(list) => list.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
            Value::Set(set) => set.serialize(serializer),
            Value::Tracked(tracked) => tracked.to_raw().serialize(serializer),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.target().read();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in fields.iter() {
            map.serialize_entry(&**name, value)?;
        }
        map.end()
    }
}

impl Serialize for List {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = self.target().read();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Map keys are written in their display form.
impl Serialize for Map {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.target().read();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries.iter() {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// Sets are written as a sequence of their members.
impl Serialize for Set {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let members = self.target().read();
        let mut seq = serializer.serialize_seq(Some(members.len()))?;
        for key in members.iter() {
            seq.serialize_element(key)?;
        }
        seq.end()
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Key::Bool(b) => serializer.serialize_bool(*b),
            Key::Int(i) => serializer.serialize_i64(*i),
            Key::Str(s) => serializer.serialize_str(s),
        }
    }
}
