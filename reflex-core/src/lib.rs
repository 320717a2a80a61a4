//! Reflex Core
//!
//! This crate provides a fine-grained reactive dependency-tracking engine.
//! It implements:
//!
//! - Tracked state: records, lists, maps and sets whose reads are recorded and
//!   whose writes propagate
//! - Effects that rerun when what they read changes
//! - Batching, so a group of writes reruns each effect once
//! - A per-dependency version clock and stale-link cleanup
//! - Computed values layered on the same hooks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the registry (`track` / `trigger`), effects, batches and
//!   computeds
//! - `state`: the value model and the tracked wrappers over it
//! - `error`: the error type shared by every fallible operation
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use reflex_core::reactive::Effect;
//! use reflex_core::state::{wrap, Record, Value};
//!
//! let raw: Record = [("count", 0)].into_iter().collect();
//! let state = wrap(Value::from(raw)).as_record().unwrap();
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let effect = Effect::new({
//!     let state = state.clone();
//!     let log = log.clone();
//!     move || log.lock().push(state.get("count").as_int().unwrap_or(0))
//! });
//!
//! state.set("count", 1).unwrap();
//! effect.stop();
//! state.set("count", 2).unwrap();
//!
//! assert_eq!(*log.lock(), vec![0, 1]);
//! ```

pub mod error;
pub mod reactive;
pub mod state;

pub use error::{ReactiveError, Result};
pub use reactive::{batch, computed, create_effect, track, trigger, untracked, Computed, Effect};
pub use state::{wrap, Value};
