//! Batch Controller
//!
//! Coalesces triggers so each affected effect reruns once per batch.
//!
//! # Algorithm
//!
//! A batch is a thread-local nesting counter plus an ordered, duplicate-free
//! queue of pending effects. While the counter is above zero, triggers only
//! enqueue. When the outermost scope closes, the queue is drained:
//!
//! 1. Take the whole queue as one pass.
//! 2. Visit its effects in insertion order. The queue holds effects
//!    weakly, so effects disposed since they were queued are gone; stopped
//!    effects are dropped;
//!    effects whose linked dependencies are all at the versions they last
//!    observed are skipped (this is what keeps diamond-shaped graphs from
//!    rerunning an effect twice).
//! 3. Effects queued while the pass runs form the next pass. Repeat until a
//!    pass comes up empty.
//!
//! Every drain is bounded by [`RuntimeConfig::max_drain_passes`]; a queue
//! that keeps refilling past the bound is reported as
//! [`ReactiveError::RunawayUpdate`] and discarded.
//!
//! [`RuntimeConfig::max_drain_passes`]: super::RuntimeConfig::max_drain_passes

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use tracing::{debug, error, trace};

use super::effect::EffectState;
use super::runtime::Runtime;
use super::subscriber::{Reactive, SubscriberId};
use crate::error::{ReactiveError, Result};

#[derive(Default)]
struct BatchState {
    depth: usize,
    draining: bool,
    queue: IndexMap<SubscriberId, Weak<dyn Reactive>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Open a batch scope. Scopes nest; only the outermost close drains.
pub fn start_batch() {
    BATCH.with(|batch| batch.borrow_mut().depth += 1);
}

/// Close a batch scope, draining the queue if this was the outermost one.
///
/// Every `start_batch` must be paired with exactly one `end_batch`, on error
/// paths too; [`batch`] does the pairing for you.
pub fn end_batch() -> Result<()> {
    let should_drain = BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        if batch.depth == 0 {
            return Err(ReactiveError::UnbalancedBatch);
        }
        batch.depth -= 1;
        Ok(batch.depth == 0 && !batch.draining)
    })?;

    if should_drain {
        drain()
    } else {
        Ok(())
    }
}

/// Check if currently inside a batch.
pub fn is_batching() -> bool {
    BATCH.with(|batch| batch.borrow().depth > 0)
}

/// Run `f` inside a batch scope.
///
/// The scope is closed even if `f` panics; in that case the pending queue is
/// discarded instead of drained.
pub fn batch<T>(f: impl FnOnce() -> T) -> Result<T> {
    struct Scope {
        armed: bool,
    }

    impl Drop for Scope {
        fn drop(&mut self) {
            if self.armed {
                abandon_batch();
            }
        }
    }

    start_batch();
    let mut scope = Scope { armed: true };
    let value = f();
    scope.armed = false;
    end_batch()?;
    Ok(value)
}

/// Number of effects waiting in the queue.
pub fn pending_count() -> usize {
    BATCH.with(|batch| batch.borrow().queue.len())
}

pub(crate) fn enqueue(subscriber: &Arc<dyn Reactive>) {
    BATCH.with(|batch| {
        batch
            .borrow_mut()
            .queue
            .entry(subscriber.subscriber_id())
            .or_insert_with(|| Arc::downgrade(subscriber));
    });
}

/// Drop a pending run, if any.
pub(crate) fn dequeue(id: SubscriberId) {
    let removed = BATCH.try_with(|batch| {
        batch
            .try_borrow_mut()
            .ok()
            .and_then(|mut batch| batch.queue.shift_remove(&id))
    });
    drop(removed);
}

fn abandon_batch() {
    let discarded = BATCH.try_with(|batch| {
        let mut batch = batch.borrow_mut();
        batch.depth = batch.depth.saturating_sub(1);
        if batch.depth == 0 && !batch.draining {
            std::mem::take(&mut batch.queue)
        } else {
            IndexMap::new()
        }
    });
    drop(discarded);
}

/// Marks the thread as draining; on unwind the queue is discarded.
struct DrainGuard;

impl DrainGuard {
    fn begin() -> Self {
        BATCH.with(|batch| batch.borrow_mut().draining = true);
        DrainGuard
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        let discarded = BATCH.try_with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.draining = false;
            if std::thread::panicking() {
                std::mem::take(&mut batch.queue)
            } else {
                IndexMap::new()
            }
        });
        drop(discarded);
    }
}

fn drain() -> Result<()> {
    let max_passes = Runtime::config().max_drain_passes;
    let _guard = DrainGuard::begin();
    let mut passes = 0;

    loop {
        let pass = BATCH.with(|batch| std::mem::take(&mut batch.borrow_mut().queue));
        if pass.is_empty() {
            return Ok(());
        }

        passes += 1;
        if passes > max_passes {
            error!(max_passes, pending = pass.len(), "batch did not settle, discarding queue");
            drop(pass);
            let rest = BATCH.with(|batch| std::mem::take(&mut batch.borrow_mut().queue));
            drop(rest);
            return Err(ReactiveError::RunawayUpdate { passes: max_passes });
        }

        debug!(pass = passes, effects = pass.len(), "draining batch queue");
        for (id, subscriber) in pass {
            let Some(subscriber) = subscriber.upgrade() else {
                trace!(subscriber = ?id, "effect dropped while queued");
                continue;
            };
            if subscriber.effect_state() == EffectState::Stopped {
                continue;
            }
            if !subscriber.is_dirty() {
                trace!(subscriber = ?id, "dependencies unchanged, skipping rerun");
                continue;
            }
            subscriber.notify();
        }
    }
}
