//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: the registry that
//! links reads to effects, effects themselves, batching, and computed
//! values layered on the same hooks.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A dependency is the subscriber set for one (target, field) pair plus a
//! version counter. [`track`] adds the running effect to it; [`trigger`]
//! bumps the version and queues every subscriber.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation. Each run records what it
//! reads, and links that were not read again are dropped when the run
//! finishes.
//!
//! ## Batches
//!
//! [`start_batch`] / [`end_batch`] (or [`batch`]) defer reruns until the
//! outermost scope closes, so an effect reruns once per batch no matter how
//! many of its dependencies changed.
//!
//! ## Computeds
//!
//! A [`Computed`] caches a derived value and only propagates when the
//! recomputed value differs.
//!
//! # Implementation Notes
//!
//! The registry, the active-effect slot and the batch queue are
//! thread-local. The engine is single-threaded and cooperative: everything
//! runs synchronously on the thread that reads or writes.

mod batch;
mod computed;
mod context;
mod dep;
mod effect;
mod runtime;
mod subscriber;

pub use batch::{batch, end_batch, is_batching, pending_count, start_batch};
pub use computed::{computed, Computed, ComputedState};
pub use context::{untracked, ReactiveContext};
pub use dep::{DepKey, Field, Key, TargetId};
pub use effect::{create_effect, Effect, EffectOptions, EffectState, Scheduler};
pub use runtime::{track, trigger, Runtime, RuntimeConfig, DEFAULT_MAX_DRAIN_PASSES};
pub use subscriber::{Reactive, SubscriberId};
