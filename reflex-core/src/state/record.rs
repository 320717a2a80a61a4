//! Tracked records.

use std::sync::Arc;

use super::raw::{Fields, Record, Target};
use super::tracked::{
    proxy_for, reject_field, reject_frozen, size_value, to_raw, trigger_fields, wrap, Observable,
    Proxy,
};
use super::value::Value;
use crate::error::Result;
use crate::reactive::{track, trigger, Field, Key, TargetId};

/// Tracked view over a [`Record`].
///
/// Reading a field links the running effect to that field; listing the
/// fields links it to the record's key set. Writes compare against the
/// stored value and only propagate on change.
#[derive(Clone)]
pub struct TrackedRecord {
    proxy: Arc<Proxy<Fields>>,
}

impl TrackedRecord {
    /// Wrap a raw record. Equivalent to [`wrap`] on a record value, but
    /// ignores the raw and frozen flags.
    pub fn new(record: &Record) -> Self {
        Self::from_proxy(proxy_for(record.target()))
    }

    pub(crate) fn from_proxy(proxy: Arc<Proxy<Fields>>) -> Self {
        Self { proxy }
    }

    fn target(&self) -> &Target<Fields> {
        &self.proxy.target
    }

    pub fn id(&self) -> TargetId {
        self.target().id()
    }

    /// Read a field. Missing fields read as `Null`; composites come back
    /// wrapped.
    pub fn get(&self, name: &str) -> Value {
        track(self.id(), name);
        let value = self.target().read().get(name).cloned();
        wrap(value.unwrap_or_default())
    }

    pub fn has(&self, name: &str) -> bool {
        track(self.id(), name);
        self.target().read().contains_key(name)
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        track(self.id(), Field::Iterate);
        self.target().read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        track(self.id(), Field::Iterate);
        self.target().read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all fields, tracking the key set and every field read.
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        let id = self.id();
        track(id, Field::Iterate);
        let fields: Vec<(Arc<str>, Value)> = self
            .target()
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        fields
            .into_iter()
            .map(|(name, value)| {
                track(id, Field::Key(Key::Str(name.clone())));
                (name, wrap(value))
            })
            .collect()
    }

    /// Write a field. Adding a field also changes the key set.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(());
        }

        let value = to_raw(value.into());
        let added = {
            let mut fields = target.write();
            match fields.get_mut(name) {
                Some(current) if current.same_value(&value) => return Ok(()),
                Some(current) => {
                    *current = value;
                    false
                }
                None => {
                    fields.insert(Arc::from(name), value);
                    true
                }
            }
        };

        if added {
            trigger_fields(self.id(), [Field::from(name), Field::Iterate])
        } else {
            trigger(self.id(), name)
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&self, name: &str) -> Result<Option<Value>> {
        let target = self.target();
        if target.is_frozen() {
            reject_frozen(self.id());
            return Ok(None);
        }

        let removed = target.write().shift_remove(name);
        match removed {
            Some(previous) => {
                trigger_fields(self.id(), [Field::from(name), Field::Iterate])?;
                Ok(Some(wrap(previous)))
            }
            None => Ok(None),
        }
    }

    /// The raw record behind this view.
    pub fn to_raw(&self) -> Record {
        Record::from_target(self.proxy.target.clone())
    }

    /// Whether both handles are the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.proxy, &other.proxy)
    }
}

impl Observable for TrackedRecord {
    fn target_id(&self) -> TargetId {
        self.id()
    }

    fn read(&self, field: &Field) -> Value {
        match field {
            Field::Key(Key::Str(name)) => self.get(name),
            Field::Key(key) => self.get(&key.to_string()),
            Field::Iterate | Field::Length => size_value(self.len()),
            Field::Index(index) => self.get(&index.to_string()),
            Field::Value => Value::Null,
        }
    }

    fn write(&self, field: Field, value: Value) -> Result<()> {
        match field {
            Field::Key(Key::Str(name)) => self.set(&name, value),
            Field::Key(key) => self.set(&key.to_string(), value),
            Field::Index(index) => self.set(&index.to_string(), value),
            field @ (Field::Iterate | Field::Length | Field::Value) => {
                reject_field(self.id(), &field);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Effect, Runtime};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> TrackedRecord {
        let record: Record = [("count", 0)].into_iter().collect();
        TrackedRecord::new(&record)
    }

    #[test]
    fn read_links_once_per_field() {
        let state = counter();
        let effect = Effect::new({
            let state = state.clone();
            move || {
                state.get("count");
                state.get("count");
            }
        });
        assert_eq!(effect.dependency_count(), 1);
        assert_eq!(Runtime::subscriber_count(state.id(), "count"), 1);
    }

    #[test]
    fn write_reruns_reader() {
        let state = counter();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _effect = Effect::new({
            let state = state.clone();
            let seen = seen.clone();
            move || seen.lock().push(state.get("count").as_int())
        });

        state.set("count", 1).unwrap();
        state.set("count", 2).unwrap();
        assert_eq!(*seen.lock(), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn unchanged_write_does_not_propagate() {
        let state = counter();
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = Effect::new({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                state.get("count");
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        state.set("count", 0).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adding_a_field_reruns_key_readers() {
        let state = counter();
        let keys = Arc::new(Mutex::new(Vec::new()));
        let _effect = Effect::new({
            let state = state.clone();
            let keys = keys.clone();
            move || keys.lock().push(state.keys().len())
        });

        state.set("count", 5).unwrap();
        state.set("total", 1).unwrap();
        state.remove("total").unwrap();
        assert_eq!(*keys.lock(), vec![1, 2, 1]);
    }

    #[test]
    fn nested_records_are_wrapped_on_read() {
        let inner: Record = [("name", "a")].into_iter().collect();
        let outer: Record = [("inner", Value::from(inner.clone()))].into_iter().collect();
        let state = TrackedRecord::new(&outer);

        let nested = state.get("inner").as_record().unwrap();
        assert_eq!(nested.id(), inner.id());
        assert!(nested.ptr_eq(&state.get("inner").as_record().unwrap()));
    }

    #[test]
    fn writes_store_raw_values() {
        let state = counter();
        let other = TrackedRecord::new(&Record::new());
        state.set("link", other.clone()).unwrap();

        match state.to_raw().get("link") {
            Some(Value::Record(raw)) => assert_eq!(raw.id(), other.id()),
            other => panic!("expected raw record, got {other:?}"),
        }
    }

    #[test]
    fn frozen_write_is_ignored() {
        let record: Record = [("count", 0)].into_iter().collect();
        let state = TrackedRecord::new(&record);
        record.freeze();

        state.set("count", 1).unwrap();
        assert_eq!(record.get("count"), Some(Value::Int(0)));
    }

    #[test]
    fn batched_writes_rerun_once() {
        let state = counter();
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = Effect::new({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                state.get("count");
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        batch(|| {
            state.set("count", 1).unwrap();
            state.set("count", 2).unwrap();
            state.set("count", 3).unwrap();
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(state.get("count"), Value::Int(3));
    }

    #[test]
    fn observable_read_and_write() {
        let state = counter();
        state.write(Field::from("count"), Value::from(4)).unwrap();
        assert_eq!(state.read(&Field::from("count")), Value::Int(4));
        assert_eq!(state.read(&Field::Iterate), Value::Int(1));
    }

    #[test]
    fn signed_zero_overwrite_reruns_reader() {
        let raw: Record = [("x", 0.0)].into_iter().collect();
        let state = TrackedRecord::new(&raw);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _effect = Effect::new({
            let state = state.clone();
            let seen = seen.clone();
            move || seen.lock().push(state.get("x").as_float())
        });

        state.set("x", -0.0).unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].is_some_and(|x| x.is_sign_negative()));
    }

    #[test]
    fn structural_field_write_is_ignored() {
        let state = counter();
        state.write(Field::Length, Value::from(0)).unwrap();
        state.write(Field::Iterate, Value::Null).unwrap();
        assert_eq!(state.keys().len(), 1);
        assert_eq!(state.get("count"), Value::Int(0));
    }
}
