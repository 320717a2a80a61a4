//! Tracked maps.

use std::sync::Arc;

use super::raw::{Entries, Map, Target};
use super::tracked::{
    proxy_for, reject_field, reject_frozen, size_value, to_raw, trigger_fields, wrap, Observable,
    Proxy,
};
use super::value::Value;
use crate::error::Result;
use crate::reactive::{track, Field, Key, TargetId};

/// Tracked view over a [`Map`].
///
/// Lookups link to the key. Size and iteration link to `Iterate`, which
/// every write triggers, since both key-set changes and value changes show
/// up in iteration.
#[derive(Clone)]
pub struct TrackedMap {
    proxy: Arc<Proxy<Entries>>,
}

impl TrackedMap {
    /// Wrap a raw map, ignoring the raw and frozen flags.
    pub fn new(map: &Map) -> Self {
        Self::from_proxy(proxy_for(map.target()))
    }

    pub(crate) fn from_proxy(proxy: Arc<Proxy<Entries>>) -> Self {
        Self { proxy }
    }

    fn target(&self) -> &Target<Entries> {
        &self.proxy.target
    }

    pub fn id(&self) -> TargetId {
        self.target().id()
    }

    /// Look up a key. Missing keys read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        let value = self.target().read().get(&key).cloned();
        track(self.id(), Field::Key(key));
        wrap(value.unwrap_or_default())
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let present = self.target().read().contains_key(&key);
        track(self.id(), Field::Key(key));
        present
    }

    pub fn len(&self) -> usize {
        track(self.id(), Field::Iterate);
        self.target().read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<Key> {
        track(self.id(), Field::Iterate);
        self.target().read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        track(self.id(), Field::Iterate);
        let values: Vec<Value> = self.target().read().values().cloned().collect();
        values.into_iter().map(wrap).collect()
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        track(self.id(), Field::Iterate);
        let entries: Vec<(Key, Value)> = self
            .target()
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(key, value)| (key, wrap(value)))
            .collect()
    }

    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(());
        }

        let key = key.into();
        let value = to_raw(value.into());
        {
            let mut entries = target.write();
            match entries.get_mut(&key) {
                Some(current) if current.same_value(&value) => return Ok(()),
                Some(current) => *current = value,
                None => {
                    entries.insert(key.clone(), value);
                }
            }
        }
        trigger_fields(self.id(), [Field::Key(key), Field::Iterate])
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(None);
        }

        let key = key.into();
        let removed = target.write().shift_remove(&key);
        match removed {
            Some(previous) => {
                trigger_fields(self.id(), [Field::Key(key), Field::Iterate])?;
                Ok(Some(wrap(previous)))
            }
            None => Ok(None),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(());
        }

        let cleared = std::mem::take(&mut *target.write());
        if cleared.is_empty() {
            return Ok(());
        }
        let fields = cleared
            .into_keys()
            .map(Field::Key)
            .chain(std::iter::once(Field::Iterate));
        trigger_fields(self.id(), fields)
    }

    /// The raw map behind this view.
    pub fn to_raw(&self) -> Map {
        Map::from_target(self.proxy.target.clone())
    }

    /// Whether both handles are the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.proxy, &other.proxy)
    }
}

impl Observable for TrackedMap {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn read(&self, field: &Field) -> Value {
        match field {
            Field::Key(key) => self.get(key.clone()),
            Field::Iterate | Field::Length => size_value(self.len()),
            Field::Index(_) | Field::Value => Value::Null,
        }
    }

    fn write(&self, field: Field, value: Value) -> Result<()> {
        match field {
            Field::Key(key) => self.insert(key, value),
            field @ (Field::Index(_) | Field::Iterate | Field::Length | Field::Value) => {
                reject_field(self.id(), &field);
                Ok(())
            }
        }
    }
}
