//! Tracked State
//!
//! Wraps plain data so that reads inside an effect are recorded and writes
//! rerun the effects that read what changed.
//!
//! # Values
//!
//! [`Value`] is the dynamic value model: primitives plus four kinds of
//! shared composite ([`Record`], [`List`], [`Map`], [`Set`]). Composites have
//! identity; two handles to the same composite are the same value.
//!
//! # Wrapping
//!
//! [`wrap`] returns the tracked view of a composite. Views are cached by
//! identity, so wrapping the same composite twice yields the same view.
//! Nested composites are wrapped lazily as they are read, and writes always
//! store the raw composite, never a view.
//!
//! ```
//! use reflex_core::reactive::Effect;
//! use reflex_core::state::{wrap, Record, Value};
//!
//! let raw: Record = [("count", 0)].into_iter().collect();
//! let state = wrap(Value::from(raw)).as_record().unwrap();
//!
//! let effect = Effect::new({
//!     let state = state.clone();
//!     move || state.get("count").as_int()
//! });
//! state.set("count", 1).unwrap();
//! assert_eq!(effect.run_count(), 2);
//! ```

mod list;
mod map;
mod raw;
mod record;
mod set;
mod tracked;
mod value;

pub use list::{TrackedList, MAX_LIST_LEN};
pub use map::TrackedMap;
pub use raw::{List, Map, Record, Set};
pub use record::TrackedRecord;
pub use set::TrackedSet;
pub use tracked::{is_tracked, live_proxy_count, mark_raw, to_raw, wrap, Observable, Tracked};
pub use value::Value;
