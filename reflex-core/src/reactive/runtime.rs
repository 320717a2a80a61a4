//! Reactive Runtime
//!
//! The runtime owns the dependency registry: one subscriber set per
//! (target, field) pair that has been read inside an effect. It connects
//! tracked state to effects.
//!
//! # How It Works
//!
//! 1. When tracked state is read while an effect is active, [`track`]
//!    links the effect to the dependency for that (target, field), creating
//!    the dependency on first use.
//!
//! 2. When tracked state is written, [`trigger`] bumps the dependency's
//!    version and hands every linked effect to the batch controller. An
//!    unbatched trigger opens and closes its own batch, so its effects run
//!    before `trigger` returns.
//!
//! 3. When an effect drops a link (stale read, stop, drop), the dependency
//!    is freed as soon as its subscriber set is empty.
//!
//! # Lifetime
//!
//! The engine is single-threaded: each thread has its own registry,
//! initialized lazily on first use and never torn down. It holds only weak
//! references to effects, so it never keeps one alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Weak;

use tracing::{debug, trace};

use super::batch;
use super::context::ReactiveContext;
use super::dep::{DepKey, Dependency, Field, Subscribers, TargetId};
use super::effect::EffectState;
use super::subscriber::SubscriberId;
use crate::error::Result;

/// Default bound on batch drain passes.
pub const DEFAULT_MAX_DRAIN_PASSES: usize = 100;

/// Per-thread engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How many times the batch queue may be refilled and drained before
    /// the batch is reported as a runaway update.
    pub max_drain_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_drain_passes: DEFAULT_MAX_DRAIN_PASSES,
        }
    }
}

/// A derived value the registry can ask to bring itself up to date before
/// a subscriber compares versions.
pub(crate) trait Derived: Send + Sync {
    /// Recompute if any source changed; bumps the derived dependency's
    /// version when the value actually changed.
    fn refresh(&self);
}

#[derive(Default)]
struct Registry {
    deps: HashMap<DepKey, Dependency>,
    derived: HashMap<TargetId, Weak<dyn Derived>>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
    static CONFIG: Cell<RuntimeConfig> = Cell::new(RuntimeConfig::default());
}

/// Record that the active effect read `field` of `target`.
///
/// No-op when no effect is active or the active effect has been stopped.
/// Linking is idempotent: reading the same field twice in one run leaves a
/// single link.
pub fn track(target: TargetId, field: impl Into<Field>) {
    let Some(active) = ReactiveContext::current() else {
        return;
    };
    if active.effect_state() == EffectState::Stopped {
        return;
    }

    let key = DepKey::new(target, field.into());
    let version = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let dep = registry.deps.entry(key.clone()).or_insert_with(Dependency::new);
        if dep.subscribe(&active) {
            trace!(subscriber = ?active.subscriber_id(), key = ?key, "linked dependency");
        }
        dep.version()
    });
    active.link(key, version);
}

/// Propagate a write to `field` of `target`.
///
/// No-op when nothing depends on it. Otherwise the dependency's version is
/// bumped and every linked effect is queued; outside a batch the queue is
/// drained before this returns, which is where a runaway update surfaces.
pub fn trigger(target: TargetId, field: impl Into<Field>) -> Result<()> {
    let key = DepKey::new(target, field.into());
    let subscribers = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let dep = registry.deps.get_mut(&key)?;
        let version = dep.bump();
        let live = dep.live_subscribers();
        if dep.is_empty() {
            registry.deps.remove(&key);
        }
        debug!(key = ?key, version, subscribers = live.len(), "trigger");
        Some(live)
    });

    match subscribers {
        Some(subscribers) => schedule(subscribers),
        None => Ok(()),
    }
}

/// Queue the subscribers of `key` without bumping its version.
///
/// Used by derived values: their version moves when they recompute to a new
/// value, not when a source changes.
pub(crate) fn notify(key: &DepKey) -> Result<()> {
    let subscribers = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        let dep = registry.deps.get_mut(key)?;
        let live = dep.live_subscribers();
        if dep.is_empty() {
            registry.deps.remove(key);
        }
        Some(live)
    });

    match subscribers {
        Some(subscribers) => schedule(subscribers),
        None => Ok(()),
    }
}

fn schedule(subscribers: Subscribers) -> Result<()> {
    batch::start_batch();
    for subscriber in subscribers {
        match subscriber.effect_state() {
            EffectState::Stopped => continue,
            EffectState::Running if !subscriber.is_reentrant() => {
                trace!(subscriber = ?subscriber.subscriber_id(), "skipping running effect");
                continue;
            }
            _ => batch::enqueue(&subscriber),
        }
    }
    batch::end_batch()
}

/// Bump the version of `key` without notifying anyone.
pub(crate) fn bump(key: &DepKey) {
    REGISTRY.with(|registry| {
        if let Some(dep) = registry.borrow_mut().deps.get_mut(key) {
            dep.bump();
        }
    });
}

/// Current version of `key`, if anything depends on it.
pub(crate) fn version(key: &DepKey) -> Option<u64> {
    REGISTRY.with(|registry| registry.borrow().deps.get(key).map(Dependency::version))
}

/// Remove the link between `key` and `subscriber`, freeing the dependency
/// once nothing subscribes to it.
pub(crate) fn unlink(key: &DepKey, subscriber: SubscriberId) {
    // Called from drop paths, possibly during thread teardown.
    let _ = REGISTRY.try_with(|registry| {
        let Ok(mut registry) = registry.try_borrow_mut() else {
            return;
        };
        if let Some(dep) = registry.deps.get_mut(key) {
            dep.unsubscribe(subscriber);
            if dep.is_empty() {
                registry.deps.remove(key);
                trace!(key = ?key, "freed dependency");
            }
        }
    });
}

pub(crate) fn register_derived(target: TargetId, derived: Weak<dyn Derived>) {
    REGISTRY.with(|registry| {
        registry.borrow_mut().derived.insert(target, derived);
    });
}

pub(crate) fn unregister_derived(target: TargetId) {
    let _ = REGISTRY.try_with(|registry| {
        if let Ok(mut registry) = registry.try_borrow_mut() {
            registry.derived.remove(&target);
        }
    });
}

/// Bring a derived target up to date. No-op for plain state.
pub(crate) fn refresh_derived(target: TargetId) {
    let derived = REGISTRY.with(|registry| {
        registry
            .borrow()
            .derived
            .get(&target)
            .and_then(Weak::upgrade)
    });
    if let Some(derived) = derived {
        derived.refresh();
    }
}

/// Introspection and configuration for the current thread's engine.
pub struct Runtime;

impl Runtime {
    /// Replace this thread's settings.
    pub fn configure(config: RuntimeConfig) {
        CONFIG.with(|c| c.set(config));
    }

    /// This thread's settings.
    pub fn config() -> RuntimeConfig {
        CONFIG.with(Cell::get)
    }

    /// Number of live dependencies in this thread's registry.
    pub fn dependency_count() -> usize {
        REGISTRY.with(|registry| registry.borrow().deps.len())
    }

    /// Number of effects linked to `field` of `target`.
    pub fn subscriber_count(target: TargetId, field: impl Into<Field>) -> usize {
        let key = DepKey::new(target, field.into());
        REGISTRY.with(|registry| registry.borrow().deps.get(&key).map_or(0, Dependency::len))
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{Effect, EffectOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn track_outside_effect_is_noop() {
        let target = TargetId::new();
        track(target, "count");
        assert_eq!(Runtime::subscriber_count(target, "count"), 0);
    }

    #[test]
    fn trigger_without_dependency_is_noop() {
        let target = TargetId::new();
        assert!(trigger(target, "count").is_ok());
    }

    #[test]
    fn repeated_reads_link_once() {
        let target = TargetId::new();
        let effect = Effect::new(move || {
            track(target, "count");
            track(target, "count");
        });

        assert_eq!(Runtime::subscriber_count(target, "count"), 1);
        assert_eq!(effect.dependency_count(), 1);
    }

    #[test]
    fn trigger_reruns_linked_effect() {
        let target = TargetId::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            track(target, "count");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        trigger(target, "count").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Unrelated field.
        trigger(target, "other").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stopped_effect_frees_dependency() {
        let target = TargetId::new();
        let effect = Effect::new(move || track(target, "count"));
        assert_eq!(Runtime::subscriber_count(target, "count"), 1);

        effect.stop();
        assert_eq!(Runtime::subscriber_count(target, "count"), 0);
        assert!(version(&DepKey::new(target, Field::from("count"))).is_none());
    }

    #[test]
    fn dropped_effect_is_pruned() {
        let target = TargetId::new();
        let effect = Effect::new(move || track(target, "count"));
        drop(effect);

        assert_eq!(Runtime::subscriber_count(target, "count"), 0);
        assert!(trigger(target, "count").is_ok());
    }

    #[test]
    fn self_write_does_not_reenter() {
        let target = TargetId::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            track(target, "count");
            runs_clone.fetch_add(1, Ordering::SeqCst);
            trigger(target, "count").unwrap();
        });

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_self_write_runs_away() {
        let target = TargetId::new();
        Runtime::configure(RuntimeConfig { max_drain_passes: 5 });

        let outcome = Arc::new(parking_lot::Mutex::new(None));
        let outcome_clone = outcome.clone();
        let _effect = Effect::with_options(
            move || {
                track(target, "count");
                if let Err(err) = trigger(target, "count") {
                    outcome_clone.lock().get_or_insert(err);
                }
            },
            EffectOptions::new().reentrant(true),
        );

        Runtime::configure(RuntimeConfig::default());
        assert_eq!(
            *outcome.lock(),
            Some(crate::ReactiveError::RunawayUpdate { passes: 5 })
        );
    }

    #[test]
    fn config_round_trips() {
        let config = RuntimeConfig { max_drain_passes: 7 };
        Runtime::configure(config);
        assert_eq!(Runtime::config(), config);
        Runtime::configure(RuntimeConfig::default());
        assert_eq!(Runtime::config().max_drain_passes, DEFAULT_MAX_DRAIN_PASSES);
    }
}
