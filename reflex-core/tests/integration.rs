//! Integration Tests for the Reactive Engine
//!
//! These tests verify that tracked state, effects, batches and computeds
//! work together correctly.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reflex_core::reactive::{
    batch, computed, untracked, Effect, EffectOptions, Field, Runtime, RuntimeConfig,
};
use reflex_core::state::{
    is_tracked, mark_raw, wrap, List, Map, Record, Set, TrackedRecord, Value,
};
use reflex_core::ReactiveError;

fn record(fields: &[(&str, i64)]) -> TrackedRecord {
    let raw: Record = fields.iter().map(|&(k, v)| (k, v)).collect();
    wrap(Value::from(raw)).as_record().unwrap()
}

fn log_of(state: &TrackedRecord, field: &'static str) -> (Effect, Arc<Mutex<Vec<i64>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let effect = Effect::new({
        let state = state.clone();
        let log = log.clone();
        move || log.lock().push(state.get(field).as_int().unwrap_or(-1))
    });
    (effect, log)
}

/// Wrapping the same composite twice yields the same view.
#[test]
fn wrap_returns_same_view_for_same_target() {
    let raw = Record::new();
    let a = wrap(Value::from(raw.clone())).as_record().unwrap();
    let b = wrap(Value::from(raw.clone())).as_record().unwrap();

    assert!(a.ptr_eq(&b));
    assert_eq!(a.id(), raw.id());

    // Wrapping a view is a no-op
    let again = wrap(Value::from(a.clone())).as_record().unwrap();
    assert!(again.ptr_eq(&a));
}

/// Reading a field twice in one run links it once.
#[test]
fn repeated_reads_link_once() {
    let state = record(&[("count", 0)]);
    let effect = Effect::new({
        let state = state.clone();
        move || {
            state.get("count");
            state.get("count");
            state.get("count");
        }
    });

    assert_eq!(effect.dependency_count(), 1);
    assert_eq!(Runtime::subscriber_count(state.id(), "count"), 1);
}

/// Each changing write outside a batch reruns the reader once.
#[test]
fn each_write_reruns_once() {
    let state = record(&[("count", 0)]);
    let (effect, log) = log_of(&state, "count");

    state.set("count", 1).unwrap();
    state.set("count", 2).unwrap();
    state.set("count", 2).unwrap();

    assert_eq!(*log.lock(), vec![0, 1, 2]);
    assert_eq!(effect.run_count(), 3);
}

/// The canonical counter scenario: log 0, write 1, stop, write 2.
#[test]
fn stopped_effect_ignores_later_writes() {
    let state = record(&[("count", 0)]);
    let (effect, log) = log_of(&state, "count");
    assert_eq!(*log.lock(), vec![0]);

    state.set("count", 1).unwrap();
    assert_eq!(*log.lock(), vec![0, 1]);

    effect.stop();
    state.set("count", 2).unwrap();
    assert_eq!(*log.lock(), vec![0, 1]);
    assert_eq!(Runtime::subscriber_count(state.id(), "count"), 0);
}

/// Three writes in a batch rerun the reader once, seeing the last value.
#[test]
fn batch_coalesces_writes() {
    let state = record(&[("count", 0)]);
    let (effect, log) = log_of(&state, "count");

    batch(|| {
        state.set("count", 1).unwrap();
        state.set("count", 2).unwrap();
        state.set("count", 3).unwrap();
    })
    .unwrap();

    assert_eq!(*log.lock(), vec![0, 3]);
    assert_eq!(effect.run_count(), 2);
}

/// An effect reading two fields written in one batch reruns once.
#[test]
fn diamond_reruns_once_in_batch() {
    let state = record(&[("a", 1), ("b", 2)]);
    let sums = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let state = state.clone();
        let sums = sums.clone();
        move || {
            let a = state.get("a").as_int().unwrap_or(0);
            let b = state.get("b").as_int().unwrap_or(0);
            sums.lock().push(a + b);
        }
    });

    batch(|| {
        state.set("a", 10).unwrap();
        state.set("b", 20).unwrap();
    })
    .unwrap();

    assert_eq!(*sums.lock(), vec![3, 30]);
}

/// Two computeds over one field, both read by an effect: one rerun per
/// write, and never a mix of old and new values.
#[test]
fn computed_diamond_is_glitch_free() {
    let state = record(&[("count", 1)]);
    let doubled = computed({
        let state = state.clone();
        move || state.get("count").as_int().unwrap_or(0) * 2
    });
    let tripled = computed({
        let state = state.clone();
        move || state.get("count").as_int().unwrap_or(0) * 3
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let (doubled, tripled, seen) = (doubled.clone(), tripled.clone(), seen.clone());
        move || seen.lock().push((doubled.get(), tripled.get()))
    });

    state.set("count", 2).unwrap();
    assert_eq!(*seen.lock(), vec![(2, 3), (4, 6)]);
}

/// Writes in one batch rerun a reader of two computeds over the same field
/// exactly once, with both computeds settled.
#[test]
fn batched_computed_diamond_reruns_once() {
    let state = record(&[("count", 1)]);
    let doubled = computed({
        let state = state.clone();
        move || state.get("count").as_int().unwrap_or(0) * 2
    });
    let tripled = computed({
        let state = state.clone();
        move || state.get("count").as_int().unwrap_or(0) * 3
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let effect = Effect::new({
        let (doubled, tripled, seen) = (doubled.clone(), tripled.clone(), seen.clone());
        move || seen.lock().push((doubled.get(), tripled.get()))
    });

    batch(|| {
        state.set("count", 2).unwrap();
        state.set("count", 3).unwrap();
    })
    .unwrap();

    assert_eq!(effect.run_count(), 2);
    assert_eq!(*seen.lock(), vec![(2, 3), (6, 9)]);
}

/// An effect dropped while its rerun is pending never runs again.
#[test]
fn effect_dropped_inside_batch_does_not_rerun() {
    let state = record(&[("count", 0)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let effect = Effect::new({
        let (state, runs) = (state.clone(), runs.clone());
        move || {
            state.get("count");
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    batch(|| {
        state.set("count", 1).unwrap();
        drop(effect);
    })
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(Runtime::subscriber_count(state.id(), Field::from("count")), 0);
}

/// Oversized list writes fail instead of aborting, and leave readers alone.
#[test]
fn oversized_list_write_is_an_error() {
    let list = wrap(Value::from(List::new())).as_list().unwrap();
    let effect = Effect::new({
        let list = list.clone();
        move || list.len()
    });

    let result = list.set(usize::MAX, 1);
    assert!(matches!(result, Err(ReactiveError::ListCapacity { .. })));
    assert!(list.is_empty());
    assert_eq!(effect.run_count(), 1);
}

/// Set membership is tracked per member.
#[test]
fn set_membership_is_tracked_per_member() {
    let raw: Set = ["red"].into_iter().collect();
    let tags = wrap(Value::from(raw)).as_set().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let (tags, seen) = (tags.clone(), seen.clone());
        move || seen.lock().push(tags.has("blue"))
    });

    tags.add("green").unwrap();
    tags.add("blue").unwrap();
    tags.delete("red").unwrap();
    tags.delete("blue").unwrap();

    assert_eq!(*seen.lock(), vec![false, true, false]);
}

/// A computed whose value does not change stops propagation.
#[test]
fn unchanged_computed_does_not_rerun_readers() {
    let state = record(&[("count", 0)]);
    let is_even = computed({
        let state = state.clone();
        move || state.get("count").as_int().unwrap_or(0) % 2 == 0
    });
    let effect = Effect::new({
        let is_even = is_even.clone();
        move || {
            is_even.get();
        }
    });

    state.set("count", 2).unwrap();
    assert_eq!(effect.run_count(), 1);
    state.set("count", 3).unwrap();
    assert_eq!(effect.run_count(), 2);
}

/// An effect that stops itself mid-run ends with no links.
#[test]
fn stop_during_run_leaves_no_links() {
    let state = record(&[("count", 0)]);
    let slot: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));
    let effect = Effect::new({
        let state = state.clone();
        let slot = slot.clone();
        move || {
            state.get("count");
            if let Some(me) = slot.lock().as_ref() {
                me.stop();
            }
        }
    });
    *slot.lock() = Some(effect.clone());

    state.set("count", 1).unwrap();

    assert!(effect.is_stopped());
    assert_eq!(effect.dependency_count(), 0);
    assert_eq!(Runtime::subscriber_count(state.id(), "count"), 0);

    slot.lock().take();
}

/// Links not read on the latest run are dropped.
#[test]
fn branch_switch_drops_stale_links() {
    let state = record(&[("flag", 1), ("a", 0), ("b", 0)]);
    let effect = Effect::new({
        let state = state.clone();
        move || {
            if state.get("flag").as_int() == Some(1) {
                state.get("a");
            } else {
                state.get("b");
            }
        }
    });
    assert_eq!(effect.run_count(), 1);

    state.set("flag", 0).unwrap();
    assert_eq!(Runtime::subscriber_count(state.id(), "a"), 0);
    assert_eq!(Runtime::subscriber_count(state.id(), "b"), 1);

    // "a" is no longer a dependency
    state.set("a", 5).unwrap();
    assert_eq!(effect.run_count(), 2);
}

/// Nested composites are wrapped on read, and replacing one moves the
/// dependency to the new value.
#[test]
fn nested_state_tracks_through_lazy_wraps() {
    let inner: Record = [("x", 1)].into_iter().collect();
    let outer: Record = [("inner", Value::from(inner.clone()))].into_iter().collect();
    let state = wrap(Value::from(outer)).as_record().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let state = state.clone();
        let seen = seen.clone();
        move || {
            let x = state
                .get("inner")
                .as_record()
                .map(|inner| inner.get("x"))
                .and_then(|x| x.as_int());
            seen.lock().push(x);
        }
    });

    let inner_view = state.get("inner").as_record().unwrap();
    inner_view.set("x", 2).unwrap();

    let replacement: Record = [("x", 10)].into_iter().collect();
    state.set("inner", replacement).unwrap();

    // The old inner record is no longer read
    inner_view.set("x", 3).unwrap();

    assert_eq!(*seen.lock(), vec![Some(1), Some(2), Some(10)]);
}

/// Values marked raw and frozen values come back from `wrap` unchanged.
#[test]
fn raw_and_frozen_values_pass_through() {
    let skipped = mark_raw(Value::from(Record::new()));
    assert!(!is_tracked(&wrap(skipped)));

    let frozen = List::new();
    frozen.freeze();
    assert!(!is_tracked(&wrap(Value::from(frozen))));

    assert!(!is_tracked(&wrap(Value::from(42))));
    assert!(!is_tracked(&wrap(Value::from("text"))));
}

/// Map lookups and iteration track keys and the key set separately.
#[test]
fn map_container_tracks_keys_and_size() {
    let raw: Map = [("a", 1i64)].into_iter().collect();
    let map = wrap(Value::from(raw)).as_map().unwrap();

    let lookups = Arc::new(AtomicUsize::new(0));
    let _lookup = Effect::new({
        let map = map.clone();
        let lookups = lookups.clone();
        move || {
            map.get("a");
            lookups.fetch_add(1, Ordering::SeqCst);
        }
    });
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let _size = Effect::new({
        let map = map.clone();
        let sizes = sizes.clone();
        move || sizes.lock().push(map.len())
    });

    map.insert("b", 2).unwrap();
    map.remove("a").unwrap();

    assert_eq!(lookups.load(Ordering::SeqCst), 2);
    assert_eq!(*sizes.lock(), vec![1, 2, 1]);
}

/// Reads inside `untracked` create no links.
#[test]
fn untracked_reads_do_not_link() {
    let state = record(&[("count", 0)]);
    let effect = Effect::new({
        let state = state.clone();
        move || {
            untracked(|| state.get("count"));
        }
    });

    assert_eq!(effect.dependency_count(), 0);
    state.set("count", 1).unwrap();
    assert_eq!(effect.run_count(), 1);
}

/// A scheduler takes over reruns; the effect only runs when asked.
#[test]
fn scheduler_defers_reruns() {
    let state = record(&[("count", 0)]);
    let pending: Arc<Mutex<Vec<Effect>>> = Arc::new(Mutex::new(Vec::new()));
    let effect = Effect::with_options(
        {
            let state = state.clone();
            move || {
                state.get("count");
            }
        },
        EffectOptions::new().scheduler({
            let pending = pending.clone();
            move |effect: &Effect| pending.lock().push(effect.clone())
        }),
    );

    state.set("count", 1).unwrap();
    assert_eq!(effect.run_count(), 1);

    let queued: Vec<Effect> = pending.lock().drain(..).collect();
    assert_eq!(queued.len(), 1);
    for effect in queued {
        effect.run();
    }
    assert_eq!(effect.run_count(), 2);
}

/// Dropping the last handle to an effect releases its dependencies.
#[test]
fn dropped_effect_releases_dependencies() {
    let state = record(&[("count", 0)]);
    let baseline = Runtime::dependency_count();
    let (effect, _log) = log_of(&state, "count");
    assert_eq!(Runtime::dependency_count(), baseline + 1);

    drop(effect);
    assert_eq!(Runtime::dependency_count(), baseline);
}

/// A reentrant effect that keeps writing what it reads is cut off.
#[test]
fn runaway_effect_is_reported() {
    Runtime::configure(RuntimeConfig {
        max_drain_passes: 10,
    });

    let state = record(&[("count", 0)]);
    let armed = Arc::new(AtomicBool::new(false));
    let _effect = Effect::with_options(
        {
            let state = state.clone();
            let armed = armed.clone();
            move || {
                let count = state.get("count").as_int().unwrap_or(0);
                if armed.load(Ordering::SeqCst) {
                    let _ = state.set("count", count + 1);
                }
            }
        },
        EffectOptions::new().reentrant(true),
    );

    armed.store(true, Ordering::SeqCst);
    let result = state.set("count", 100);
    assert_eq!(result, Err(ReactiveError::RunawayUpdate { passes: 10 }));

    Runtime::configure(RuntimeConfig::default());
}

/// Structural reads go through the generic field interface too.
#[test]
fn observable_fields_drive_effects() {
    use reflex_core::state::Observable;

    let list = wrap(Value::from(List::from_iter([1i64, 2, 3]))).as_list().unwrap();
    let lengths = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let list = list.clone();
        let lengths = lengths.clone();
        move || lengths.lock().push(list.read(&Field::Length).as_int())
    });

    list.push(4).unwrap();
    list.write(Field::Index(0), Value::from(9)).unwrap();

    assert_eq!(*lengths.lock(), vec![Some(3), Some(4)]);
}

/// Tracked state serializes as a plain snapshot.
#[test]
fn tracked_state_serializes() {
    let source = serde_json::json!({ "count": 1, "tags": ["a"] });
    let state = wrap(Value::from(source.clone()));
    assert!(is_tracked(&state));
    assert_eq!(serde_json::to_value(&state).unwrap(), source);
}
