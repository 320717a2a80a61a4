//! Tracked sets.

use std::sync::Arc;

use super::raw::{Members, Set, Target};
use super::tracked::{
    proxy_for, reject_field, reject_frozen, size_value, trigger_fields, Observable, Proxy,
};
use super::value::Value;
use crate::error::Result;
use crate::reactive::{track, Field, Key, TargetId};

/// Tracked view over a [`Set`].
///
/// Membership tests link to the key; size and iteration link to `Iterate`.
/// Adding or deleting a member triggers both.
#[derive(Clone)]
pub struct TrackedSet {
    proxy: Arc<Proxy<Members>>,
}

impl TrackedSet {
    /// Wrap a raw set, ignoring the raw and frozen flags.
    pub fn new(set: &Set) -> Self {
        Self::from_proxy(proxy_for(set.target()))
    }

    pub(crate) fn from_proxy(proxy: Arc<Proxy<Members>>) -> Self {
        Self { proxy }
    }

    fn target(&self) -> &Target<Members> {
        &self.proxy.target
    }

    pub fn id(&self) -> TargetId {
        self.target().id()
    }

    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let present = self.target().read().contains(&key);
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

    /// Members in insertion order.
    pub fn values(&self) -> Vec<Key> {
        track(self.id(), Field::Iterate);
        self.target().read().iter().cloned().collect()
    }

    /// Add a member. Returns whether it was new.
    pub fn add(&self, key: impl Into<Key>) -> Result<bool> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(false);
        }

        let key = key.into();
        let added = target.write().insert(key.clone());
        if added {
            trigger_fields(self.id(), [Field::Key(key), Field::Iterate])?;
        }
        Ok(added)
    }

    /// Delete a member. Returns whether it was present.
    pub fn delete(&self, key: impl Into<Key>) -> Result<bool> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(false);
        }

        let key = key.into();
        let removed = target.write().shift_remove(&key);
        if removed {
            trigger_fields(self.id(), [Field::Key(key), Field::Iterate])?;
        }
        Ok(removed)
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
            .into_iter()
            .map(Field::Key)
            .chain(std::iter::once(Field::Iterate));
        trigger_fields(self.id(), fields)
    }

    /// The raw set behind this view.
    pub fn to_raw(&self) -> Set {
        Set::from_target(self.proxy.target.clone())
    }

    /// Whether both handles are the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.proxy, &other.proxy)
    }
}

/// Members read as `Bool`. Writing a key adds it for a truthy value and
/// deletes it for `Null` or `false`.
impl Observable for TrackedSet {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn read(&self, field: &Field) -> Value {
        match field {
            Field::Key(key) => Value::Bool(self.has(key.clone())),
            Field::Iterate | Field::Length => size_value(self.len()),
            Field::Index(_) | Field::Value => Value::Null,
        }
    }

    fn write(&self, field: Field, value: Value) -> Result<()> {
        match field {
            Field::Key(key) => match value {
                Value::Null | Value::Bool(false) => self.delete(key).map(drop),
                _ => self.add(key).map(drop),
            },
            field @ (Field::Index(_) | Field::Iterate | Field::Length | Field::Value) => {
                reject_field(self.id(), &field);
                Ok(())
            }
        }
    }
}
