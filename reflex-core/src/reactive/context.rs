//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when tracked state is read, the
//! registry links the read to the current effect.
//!
//! # Implementation
//!
//! The context is a single thread-local slot. Entering a context swaps the
//! new subscriber into the slot and keeps the previous occupant in the
//! returned guard; dropping the guard puts it back. Nested runs (an effect
//! body calling another effect's `run`) therefore form an explicit call
//! stack, and a panicking body still restores the outer effect on unwind.

use std::cell::RefCell;
use std::sync::Arc;

use super::subscriber::{Reactive, SubscriberId};

thread_local! {
    static ACTIVE: RefCell<Option<Arc<dyn Reactive>>> = const { RefCell::new(None) };
}

/// Guard that restores the previous active effect when dropped.
pub struct ReactiveContext {
    previous: Option<Arc<dyn Reactive>>,
}

impl ReactiveContext {
    /// Make `subscriber` the active effect until the guard is dropped.
    ///
    /// Passing `None` suspends tracking for the guard's lifetime.
    pub(crate) fn enter(subscriber: Option<Arc<dyn Reactive>>) -> Self {
        let previous = ACTIVE.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), subscriber));
        Self { previous }
    }

    /// Check if an effect is currently collecting dependencies.
    pub fn is_active() -> bool {
        ACTIVE.with(|slot| slot.borrow().is_some())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ACTIVE.with(|slot| slot.borrow().as_ref().map(|s| s.subscriber_id()))
    }

    pub(crate) fn current() -> Option<Arc<dyn Reactive>> {
        ACTIVE.with(|slot| slot.borrow().clone())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The replaced Arc may be the last handle to an effect; drop it
        // outside the borrow.
        let replaced = ACTIVE.try_with(|slot| std::mem::replace(&mut *slot.borrow_mut(), previous));
        drop(replaced);
    }
}

/// Run `f` with dependency tracking suspended.
///
/// Reads inside `f` register nothing, even when called from an effect body.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::enter(None);
    f()
}
