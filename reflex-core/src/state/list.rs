//! Tracked lists.
//!
//! Reads link to one of three kinds of field: a slot (`Index`), the length
//! (`Length`), or the whole sequence (`Iterate`). Every write triggers
//! `Iterate`, the slots whose contents changed, and `Length` when the list
//! grew or shrank.

use std::ops::Range;
use std::sync::Arc;

use super::raw::{Items, List, Target};
use super::tracked::{
    proxy_for, reject_field, reject_frozen, size_value, to_raw, trigger_fields, wrap, Observable,
    Proxy,
};
use super::value::Value;
use crate::error::{ReactiveError, Result};
use crate::reactive::{track, Field, TargetId};

/// Longest list a write may create.
pub const MAX_LIST_LEN: usize = u32::MAX as usize;

/// Tracked view over a [`List`].
#[derive(Clone)]
pub struct TrackedList {
    proxy: Arc<Proxy<Items>>,
}

/// Fields touched by a write to `slots` of a list that was `before` long and
/// is now `after` long.
fn changed_fields(slots: Range<usize>, before: usize, after: usize) -> Vec<Field> {
    let mut fields: Vec<Field> = slots.map(Field::Index).collect();
    if before != after {
        fields.push(Field::Length);
    }
    fields.push(Field::Iterate);
    fields
}

impl TrackedList {
    /// Wrap a raw list, ignoring the raw and frozen flags.
    pub fn new(list: &List) -> Self {
        Self::from_proxy(proxy_for(list.target()))
    }

    pub(crate) fn from_proxy(proxy: Arc<Proxy<Items>>) -> Self {
        Self { proxy }
    }

    fn target(&self) -> &Target<Items> {
        &self.proxy.target
    }

    pub fn id(&self) -> TargetId {
        self.target().id()
    }

    /// Read a slot. Out-of-range slots read as `Null`.
    pub fn get(&self, index: usize) -> Value {
        track(self.id(), Field::Index(index));
        let value = self.target().read().get(index).cloned();
        wrap(value.unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        track(self.id(), Field::Length);
        self.target().read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every slot, tracking the whole sequence.
    pub fn to_vec(&self) -> Vec<Value> {
        track(self.id(), Field::Iterate);
        let items = self.target().read().clone();
        items.into_iter().map(wrap).collect()
    }

    /// Position of the first slot holding the same value as `needle`.
    ///
    /// Tracked views and their raw composites are the same value here.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        track(self.id(), Field::Iterate);
        self.target()
            .read()
            .iter()
            .position(|item| item.same_value(needle))
    }

    pub fn contains(&self, needle: &Value) -> bool {
        self.index_of(needle).is_some()
    }

    /// Write a slot. Writing past the end pads the gap with `Null`.
    ///
    /// Fails with [`ReactiveError::ListCapacity`] if the list would grow past
    /// [`MAX_LIST_LEN`] slots; the list is left unchanged.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = to_raw(value.into());
        self.mutate(|items| {
            let before = items.len();
            if let Some(current) = items.get_mut(index) {
                if current.same_value(&value) {
                    return Ok(None);
                }
                *current = value;
                return Ok(Some(changed_fields(index..index + 1, before, before)));
            }
            let after = index.checked_add(1).ok_or(ReactiveError::ListCapacity {
                requested: usize::MAX,
            })?;
            grow(items, after)?;
            items[index] = value;
            Ok(Some(changed_fields(before..after, before, after)))
        })
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let value = to_raw(value.into());
        self.mutate(|items| {
            let before = items.len();
            reserve(items, before + 1)?;
            items.push(value);
            Ok(Some(changed_fields(before..before + 1, before, before + 1)))
        })
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        let mut popped = None;
        self.mutate(|items| {
            let before = items.len();
            popped = items.pop();
            if popped.is_none() {
                return Ok(None);
            }
            Ok(Some(changed_fields(before - 1..before, before, before - 1)))
        })?;
        Ok(popped.map(wrap))
    }

    /// Insert at `index`, shifting later slots. `index` is clamped to the
    /// length.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = to_raw(value.into());
        self.mutate(|items| {
            let before = items.len();
            let index = index.min(before);
            reserve(items, before + 1)?;
            items.insert(index, value);
            Ok(Some(changed_fields(index..before + 1, before, before + 1)))
        })
    }

    /// Remove the slot at `index`, shifting later slots.
    pub fn remove(&self, index: usize) -> Result<Option<Value>> {
        let mut removed = None;
        self.mutate(|items| {
            let before = items.len();
            if index >= before {
                return Ok(None);
            }
            removed = Some(items.remove(index));
            Ok(Some(changed_fields(index..before, before, before - 1)))
        })?;
        Ok(removed.map(wrap))
    }

    /// Grow with `Null` or shrink to `len`. Growing is bounded like
    /// [`set`](Self::set).
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.mutate(|items| {
            let before = items.len();
            if len == before {
                return Ok(None);
            }
            if len > before {
                grow(items, len)?;
            } else {
                items.truncate(len);
            }
            Ok(Some(changed_fields(len.min(before)..len.max(before), before, len)))
        })
    }

    /// Shrink to `len`. No-op if the list is already that short.
    pub fn truncate(&self, len: usize) -> Result<()> {
        self.mutate(|items| {
            let before = items.len();
            if len >= before {
                return Ok(None);
            }
            items.truncate(len);
            Ok(Some(changed_fields(len..before, before, len)))
        })
    }

    pub fn clear(&self) -> Result<()> {
        self.truncate(0)
    }

    /// The raw list behind this view.
    pub fn to_raw(&self) -> List {
        List::from_target(self.proxy.target.clone())
    }

    /// Whether both handles are the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.proxy, &other.proxy)
    }

    /// Apply `edit` under the write lock and trigger the fields it reports.
    /// `Ok(None)` means nothing changed; an error leaves the list untouched.
    fn mutate<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Items) -> Result<Option<Vec<Field>>>,
    {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(());
        }
        let changed = edit(&mut target.write())?;
        match changed {
            Some(fields) => trigger_fields(self.id(), fields),
            None => Ok(()),
        }
    }
}

/// Make room for `len` slots without panicking on overflow or allocation
/// failure.
fn reserve(items: &mut Items, len: usize) -> Result<()> {
    let capacity = ReactiveError::ListCapacity { requested: len };
    if len > MAX_LIST_LEN {
        return Err(capacity);
    }
    items
        .try_reserve(len.saturating_sub(items.len()))
        .map_err(|_| capacity)
}

/// Pad with `Null` up to `len` slots.
fn grow(items: &mut Items, len: usize) -> Result<()> {
    reserve(items, len)?;
    items.resize(len, Value::Null);
    Ok(())
}

impl Observable for TrackedList {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn read(&self, field: &Field) -> Value {
        match field {
            Field::Index(index) => self.get(*index),
            Field::Length => size_value(self.len()),
            Field::Iterate => {
                track(self.id(), Field::Iterate);
                size_value(self.target().read().len())
            }
            Field::Key(_) | Field::Value => Value::Null,
        }
    }

    fn write(&self, field: Field, value: Value) -> Result<()> {
        match field {
            Field::Index(index) => self.set(index, value),
            Field::Length => match value.as_int().and_then(|len| usize::try_from(len).ok()) {
                Some(len) => self.set_len(len),
                None => {
                    reject_field(self.id(), &Field::Length);
                    Ok(())
                }
            },
            field @ (Field::Key(_) | Field::Iterate | Field::Value) => {
                reject_field(self.id(), &field);
                Ok(())
            }
        }
    }
}
