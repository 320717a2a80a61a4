//! Subscriber types for the reactive system.
//!
//! A subscriber is anything the registry can notify when a dependency it
//! reads changes. Effects are the only built-in subscribers; computed values
//! subscribe through an internal effect of their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::dep::DepKey;
use super::effect::EffectState;

/// Unique identifier for a subscriber.
///
/// Each effect gets a unique ID when created. The registry keys its
/// subscriber sets by this ID, which is what gives links set semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability the registry and batch controller need from a subscriber.
///
/// The registry only ever holds weak references to implementors; the batch
/// queue holds strong ones for the duration of a drain.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Current lifecycle state.
    fn effect_state(&self) -> EffectState;

    /// Whether a trigger may re-enter this subscriber while it is running.
    fn is_reentrant(&self) -> bool;

    /// Record a forward link to `key`, observed at `version`.
    fn link(&self, key: DepKey, version: u64);

    /// Whether any linked dependency moved past the version observed when
    /// it was last read.
    fn is_dirty(&self) -> bool;

    /// Propagation entry point: hand off to the scheduler, or run inline.
    fn notify(self: Arc<Self>);
}
