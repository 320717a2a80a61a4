//! Dependency keys and the per-key subscriber set.
//!
//! A dependency is identified by the identity of the tracked value and the
//! field that was read. Fields cover named keys, list indices and a few
//! synthetic fields for structural reads (length, iteration) and derived
//! values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::subscriber::{Reactive, SubscriberId};

/// Identity of a piece of tracked state.
///
/// Every composite value and every computed value is assigned one at
/// construction; it never changes and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for TargetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A hashable key: record field names and map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Key {
    fn from(s: Arc<str>) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

/// The part of a target a dependency is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// A record field or map entry.
    Key(Key),
    /// A list slot.
    Index(usize),
    /// The length of a list.
    Length,
    /// The key set / iteration order of a container.
    Iterate,
    /// The value of a computed.
    Value,
}

impl From<Key> for Field {
    fn from(key: Key) -> Self {
        Field::Key(key)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Key(Key::from(s))
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::Key(Key::from(s))
    }
}

impl From<usize> for Field {
    fn from(index: usize) -> Self {
        Field::Index(index)
    }
}

/// Registry key: (target identity, field).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepKey {
    target: TargetId,
    field: Field,
}

impl DepKey {
    pub fn new(target: TargetId, field: Field) -> Self {
        Self { target, field }
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn field(&self) -> &Field {
        &self.field
    }
}

/// Snapshot of the subscribers to notify for one trigger.
pub(crate) type Subscribers = SmallVec<[Arc<dyn Reactive>; 4]>;

/// Subscriber set and version clock for one key.
///
/// Subscribers are held weakly and in link order, so notification order is
/// deterministic: first reader, first notified.
pub(crate) struct Dependency {
    subscribers: IndexMap<SubscriberId, Weak<dyn Reactive>>,
    version: u64,
}

impl Dependency {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: IndexMap::new(),
            version: 0,
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Returns false if the subscriber was already linked.
    pub(crate) fn subscribe(&mut self, subscriber: &Arc<dyn Reactive>) -> bool {
        let id = subscriber.subscriber_id();
        if self.subscribers.contains_key(&id) {
            return false;
        }
        self.subscribers.insert(id, Arc::downgrade(subscriber));
        true
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.shift_remove(&id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Upgrade every live subscriber, dropping entries whose effect is gone.
    pub(crate) fn live_subscribers(&mut self) -> Subscribers {
        let mut live = Subscribers::new();
        self.subscribers.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_are_unique() {
        let id1 = TargetId::new();
        let id2 = TargetId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn field_conversions() {
        assert_eq!(Field::from("count"), Field::Key(Key::Str(Arc::from("count"))));
        assert_eq!(Field::from(3usize), Field::Index(3));
        assert_eq!(Field::from(Key::Int(7)), Field::Key(Key::Int(7)));
    }

    #[test]
    fn version_bumps_are_monotonic() {
        let mut dep = Dependency::new();
        assert_eq!(dep.version(), 0);
        assert_eq!(dep.bump(), 1);
        assert_eq!(dep.bump(), 2);
        assert!(dep.is_empty());
    }

    #[test]
    fn key_display() {
        assert_eq!(Key::from("name").to_string(), "name");
        assert_eq!(Key::Int(-4).to_string(), "-4");
        assert_eq!(Key::Bool(true).to_string(), "true");
    }
}
