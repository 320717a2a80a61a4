//! Raw composites.
//!
//! Records, lists, maps and sets are shared, identity-bearing containers. A raw
//! handle reads and writes the storage directly, with no tracking; the
//! tracked wrappers in this module's siblings sit on top of the same
//! storage.
//!
//! Each composite carries two flags:
//!
//! - *raw* (skip): set by [`mark_raw`](super::mark_raw); the value is never
//!   wrapped.
//! - *frozen*: the value accepts no further writes and is never wrapped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::value::Value;
use crate::reactive::{Key, TargetId};

pub(crate) type Fields = IndexMap<Arc<str>, Value>;
pub(crate) type Items = Vec<Value>;
pub(crate) type Entries = IndexMap<Key, Value>;
pub(crate) type Members = IndexSet<Key>;

/// Storage shared by a raw handle and its tracked wrapper.
pub(crate) struct Target<D> {
    id: TargetId,
    data: RwLock<D>,
    skip: AtomicBool,
    frozen: AtomicBool,
}

impl<D> Target<D> {
    fn new(data: D) -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::new(),
            data: RwLock::new(data),
            skip: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, D> {
        self.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, D> {
        self.data.write()
    }

    pub(crate) fn is_skipped(&self) -> bool {
        self.skip.load(Ordering::Acquire)
    }

    pub(crate) fn mark_skip(&self) {
        self.skip.store(true, Ordering::Release);
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether [`wrap`](super::wrap) may instrument this target.
    pub(crate) fn is_observable(&self) -> bool {
        !self.is_skipped() && !self.is_frozen()
    }
}

macro_rules! composite_handle {
    ($name:ident, $data:ty, $label:literal) => {
        impl $name {
            /// Identity of the underlying storage.
            pub fn id(&self) -> TargetId {
                self.0.id()
            }

            /// Refuse all further writes. Frozen values are never wrapped.
            pub fn freeze(&self) {
                self.0.freeze();
            }

            pub fn is_frozen(&self) -> bool {
                self.0.is_frozen()
            }

            /// Whether this value was excluded from tracking.
            pub fn is_marked_raw(&self) -> bool {
                self.0.is_skipped()
            }

            /// Whether both handles share the same storage.
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }

            pub(crate) fn target(&self) -> &Arc<Target<$data>> {
                &self.0
            }

            pub(crate) fn from_target(target: Arc<Target<$data>>) -> Self {
                Self(target)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}(len={})", $label, self.id().raw(), self.0.read().len())
            }
        }
    };
}

/// A record: ordered, string-keyed fields.
#[derive(Clone)]
pub struct Record(Arc<Target<Fields>>);

composite_handle!(Record, Fields, "Record");

impl Record {
    pub fn new() -> Self {
        Self(Target::new(Fields::new()))
    }

    /// Untracked read.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    /// Untracked write. Returns false if the record is frozen.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.write().insert(Arc::from(name), value.into());
        true
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        self.0.read().keys().cloned().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<Arc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Target::new(fields))
    }
}

/// A list: an ordered sequence of values.
#[derive(Clone)]
pub struct List(Arc<Target<Items>>);

composite_handle!(List, Items, "List");

impl List {
    pub fn new() -> Self {
        Self(Target::new(Items::new()))
    }

    /// Untracked read.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Untracked append. Returns false if the list is frozen.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.write().push(value.into());
        true
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(Target::new(iter.into_iter().map(Into::into).collect()))
    }
}

/// An associative container keyed by [`Key`].
#[derive(Clone)]
pub struct Map(Arc<Target<Entries>>);

composite_handle!(Map, Entries, "Map");

impl Map {
    pub fn new() -> Self {
        Self(Target::new(Entries::new()))
    }

    /// Untracked read.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.0.read().get(&key.into()).cloned()
    }

    /// Untracked write. Returns false if the map is frozen.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.write().insert(key.into(), value.into());
        true
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> FromIterator<(K, V)> for Map
where
    K: Into<Key>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(Target::new(entries))
    }
}

/// A set of [`Key`]s in insertion order.
#[derive(Clone)]
pub struct Set(Arc<Target<Members>>);

composite_handle!(Set, Members, "Set");

impl Set {
    pub fn new() -> Self {
        Self(Target::new(Members::new()))
    }

    /// Untracked membership test.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.0.read().contains(&key.into())
    }

    /// Untracked add. Returns false if the set is frozen or already held
    /// the key.
    pub fn insert(&self, key: impl Into<Key>) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.write().insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Into<Key>> FromIterator<K> for Set {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(Target::new(iter.into_iter().map(Into::into).collect()))
    }
}
