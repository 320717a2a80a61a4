//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its getter inside an internal lazy
//!    effect and caches the result. Reads inside the getter link that
//!    effect to its sources.
//!
//! 2. Reading a computed tracks the computed's own dependency,
//!    `(id, Field::Value)`, so effects can subscribe to it like any field.
//!
//! 3. When a source changes, the internal effect's scheduler marks the
//!    computed dirty and queues its subscribers without bumping the
//!    computed's version.
//!
//! 4. Subscribers ask the registry whether they are dirty. For a computed
//!    dependency the registry first refreshes the computed: it recomputes,
//!    and bumps its version only if the new value differs from the cached
//!    one. Subscribers of a computed whose value did not change are skipped.
//!
//! Pulling through the registry is what keeps diamonds glitch-free: an
//! effect that reads a computed before the computed's own scheduler has run
//! gets a fresh value, and the scheduler pass afterwards finds nothing to do.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use super::dep::{DepKey, Field, TargetId};
use super::effect::{Effect, EffectOptions, EffectState};
use super::runtime::{self, Derived};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date as of its last refresh.
    Clean,

    /// A source changed. Recompute on next access.
    Dirty,
}

struct ComputedInner<T> {
    id: TargetId,
    value: RwLock<Option<T>>,
    state: Mutex<ComputedState>,
    effect: Effect<T>,
}

impl<T> ComputedInner<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn key(&self) -> DepKey {
        DepKey::new(self.id, Field::Value)
    }

    /// Scheduler callback for the internal effect.
    fn sources_changed(&self) {
        *self.state.lock() = ComputedState::Dirty;
        trace!(computed = ?self.id, "sources changed");
        if let Err(error) = runtime::notify(&self.key()) {
            tracing::error!(computed = ?self.id, %error, "failed to propagate computed change");
        }
    }

    /// Recompute if needed. Returns whether the cached value changed.
    fn update(&self) -> bool {
        if self.effect.state() == EffectState::Running {
            warn!(computed = ?self.id, "computed read itself while computing");
            return false;
        }

        let dirty = *self.state.lock() == ComputedState::Dirty;
        let empty = self.value.read().is_none();
        if !dirty && !empty && !self.effect.is_dirty() {
            return false;
        }

        let next = self.effect.run();
        let changed = {
            let mut value = self.value.write();
            let changed = value.as_ref() != Some(&next);
            *value = Some(next);
            changed
        };
        *self.state.lock() = ComputedState::Clean;

        if changed {
            runtime::bump(&self.key());
        }
        changed
    }
}

impl<T> Derived for ComputedInner<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn refresh(&self) {
        self.update();
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        runtime::unregister_derived(self.id);
        self.effect.stop();
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound is what lets a recomputation that lands on the same
/// value stop propagation.
pub struct Computed<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    /// Create a new computed with the given getter.
    ///
    /// The getter is not run until the first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let options = EffectOptions::new().lazy(true).scheduler(move |_: &Effect<T>| {
                if let Some(inner) = weak.upgrade() {
                    inner.sources_changed();
                }
            });
            ComputedInner {
                id: TargetId::new(),
                value: RwLock::new(None),
                state: Mutex::new(ComputedState::Dirty),
                effect: Effect::with_options(getter, options),
            }
        });

        let derived: Arc<dyn Derived> = inner.clone();
        runtime::register_derived(inner.id, Arc::downgrade(&derived));
        Self { inner }
    }

    /// The computed's identity in the registry.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads this computed during its first evaluation,
    /// when there is no value yet. Use [`try_with`](Self::try_with) in
    /// getters that may read themselves.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Some(result) => result,
            None => panic!("computed {:?} read itself during its first evaluation", self.inner.id),
        }
    }

    /// Like [`with`](Self::with), but returns `None` instead of panicking
    /// when there is no value to borrow.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        // Refresh before tracking so the reader observes the post-refresh
        // version.
        self.inner.update();
        runtime::track(self.inner.id, Field::Value);
        let value = self.inner.value.read();
        value.as_ref().map(f)
    }

    /// Like [`get`](Self::get), but `None` while the first evaluation is
    /// still running.
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        *self.inner.state.lock()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

/// Create a computed value.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(getter)
}

impl<T> Clone for Computed<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
