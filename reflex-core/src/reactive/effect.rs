//! Effect Implementation
//!
//! An Effect is a re-runnable computation that subscribes to the tracked
//! state it reads.
//!
//! # How Effects Work
//!
//! 1. When created (unless lazy), the effect runs its body immediately to
//!    establish initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued; when the queue
//!    drains it reruns, or its scheduler is called instead.
//!
//! 3. Each run rebuilds the dependency set from scratch. Links from the
//!    previous run that were not read again are removed when the run ends,
//!    so after every completed run the effect depends on exactly what it
//!    read.
//!
//! # Lifecycle
//!
//! `Idle -> Running -> Idle` on every run, and `Idle | Running -> Stopped`
//! on [`Effect::stop`]. Stopping is terminal and idempotent. It may happen
//! from inside the effect's own body; the run finishes but nothing it reads
//! afterwards is tracked and no queued rerun executes.
//!
//! Handles are cheap clones of one shared effect. The registry only holds
//! weak references, so dropping every handle disposes the effect and
//! unlinks it.
//!
//! # Async bodies
//!
//! Tracking is tied to the synchronous extent of `run`. A body that spawns
//! or awaits work only tracks the reads made before it returns.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::batch;
use super::context::ReactiveContext;
use super::dep::DepKey;
use super::runtime;
use super::subscriber::{Reactive, SubscriberId};

/// Lifecycle state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Not running; will rerun when a dependency changes.
    Idle,
    /// The body is executing.
    Running,
    /// Terminal. The effect holds no links and never reruns.
    Stopped,
}

/// Callback that takes over propagation for an effect.
pub type Scheduler<T> = Arc<dyn Fn(&Effect<T>) + Send + Sync>;

/// Options for [`create_effect`].
pub struct EffectOptions<T> {
    scheduler: Option<Scheduler<T>>,
    reentrant: bool,
    lazy: bool,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> EffectOptions<T> {
    pub fn new() -> Self {
        Self {
            scheduler: None,
            reentrant: false,
            lazy: false,
            on_stop: None,
        }
    }

    /// Call `scheduler` on propagation instead of running the effect.
    ///
    /// The scheduler decides when (or whether) to call [`Effect::run`].
    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect<T>) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Allow the effect to be re-triggered by its own writes.
    pub fn reentrant(mut self, reentrant: bool) -> Self {
        self.reentrant = reentrant;
        self
    }

    /// Skip the initial run performed on creation.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Called once, when the effect is stopped.
    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

impl<T> Default for EffectOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct EffectInner<T> {
    id: SubscriberId,
    body: Box<dyn Fn() -> T + Send + Sync>,
    scheduler: Option<Scheduler<T>>,
    reentrant: bool,
    state: Mutex<EffectState>,
    /// Forward links: dependency -> version observed when last read.
    deps: Mutex<IndexMap<DepKey, u64>>,
    run_count: AtomicUsize,
    on_stop: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<T> EffectInner<T> {
    fn state(&self) -> EffectState {
        *self.state.lock()
    }

    fn unlink_all(&self, keys: impl IntoIterator<Item = DepKey>) {
        for key in keys {
            runtime::unlink(&key, self.id);
        }
    }
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        let deps = std::mem::take(self.deps.get_mut());
        self.unlink_all(deps.into_keys());
        batch::dequeue(self.id);
    }
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn effect_state(&self) -> EffectState {
        self.state()
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }

    fn link(&self, key: DepKey, version: u64) {
        self.deps.lock().insert(key, version);
    }

    fn is_dirty(&self) -> bool {
        let links: SmallVec<[(DepKey, u64); 8]> = self
            .deps
            .lock()
            .iter()
            .map(|(key, version)| (key.clone(), *version))
            .collect();

        links.into_iter().any(|(key, observed)| {
            runtime::refresh_derived(key.target());
            runtime::version(&key) != Some(observed)
        })
    }

    fn notify(self: Arc<Self>) {
        let effect = Effect { inner: self };
        match effect.inner.scheduler.clone() {
            Some(scheduler) => scheduler(&effect),
            None => {
                effect.run();
            }
        }
    }
}

/// A re-runnable computation that subscribes to the state it reads.
///
/// # Example
///
/// ```rust,ignore
/// let state = wrap(Value::from(json!({ "count": 0 })));
/// let record = state.as_record().unwrap();
///
/// let effect = Effect::new(move || {
///     println!("count is {:?}", record.get("count").as_int());
/// });
///
/// record.set("count", 5)?; // prints "count is Some(5)"
/// ```
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    /// Create an effect and run it once to establish its dependencies.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(body, EffectOptions::new())
    }

    /// Create an effect without running it.
    pub fn new_lazy<F>(body: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(body, EffectOptions::new().lazy(true))
    }

    /// Create an effect with explicit options.
    pub fn with_options<F>(body: F, options: EffectOptions<T>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: SubscriberId::new(),
                body: Box::new(body),
                scheduler: options.scheduler,
                reentrant: options.reentrant,
                state: Mutex::new(EffectState::Idle),
                deps: Mutex::new(IndexMap::new()),
                run_count: AtomicUsize::new(0),
                on_stop: Mutex::new(options.on_stop),
            }),
        };
        debug!(subscriber = ?effect.id(), lazy = options.lazy, "effect created");

        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Run the body, rebuilding the dependency set from what it reads.
    ///
    /// A stopped effect just calls its body, without tracking. A panic in the
    /// body propagates after the active-effect context and link bookkeeping
    /// have been restored.
    pub fn run(&self) -> T {
        let inner = &self.inner;
        let prev_state = {
            let mut state = inner.state.lock();
            if *state == EffectState::Stopped {
                drop(state);
                return (inner.body)();
            }
            std::mem::replace(&mut *state, EffectState::Running)
        };

        let previous = std::mem::take(&mut *inner.deps.lock());
        let subscriber: Arc<dyn Reactive> = inner.clone();
        let _run = RunGuard {
            inner,
            previous,
            prev_state,
            _ctx: ReactiveContext::enter(Some(subscriber)),
        };

        inner.run_count.fetch_add(1, Ordering::Relaxed);
        (inner.body)()
    }

    /// Whether a dependency changed since it was last read.
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }
}

impl<T> Effect<T> {
    /// Unlink from every dependency and stop for good.
    ///
    /// Idempotent. Any queued rerun is dropped.
    pub fn stop(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock();
            if *state == EffectState::Stopped {
                return;
            }
            *state = EffectState::Stopped;
        }

        let deps = std::mem::take(&mut *inner.deps.lock());
        inner.unlink_all(deps.into_keys());
        batch::dequeue(inner.id);
        debug!(subscriber = ?inner.id, "effect stopped");

        let on_stop = inner.on_stop.lock().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EffectState {
        self.inner.state()
    }

    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state() == EffectState::Stopped
    }

    /// Get the number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

/// Create an effect; runs it immediately unless `options` say lazy.
pub fn create_effect<T, F>(body: F, options: EffectOptions<T>) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Effect::with_options(body, options)
}

/// Finishes a run: drops stale links and restores state and context.
struct RunGuard<'a, T> {
    inner: &'a EffectInner<T>,
    previous: IndexMap<DepKey, u64>,
    prev_state: EffectState,
    _ctx: ReactiveContext,
}

impl<T> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        let stale: Vec<DepKey> = {
            let mut state = self.inner.state.lock();
            if *state == EffectState::Stopped {
                previous.into_keys().collect()
            } else {
                *state = self.prev_state;
                let current = self.inner.deps.lock();
                previous
                    .into_keys()
                    .filter(|key| !current.contains_key(key))
                    .collect()
            }
        };
        self.inner.unlink_all(stale);
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
