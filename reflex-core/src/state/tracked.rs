//! Wrapping, the proxy identity cache, and the shared write helpers.
//!
//! A composite has at most one live tracked view at a time. Views are
//! cached process-wide by target identity and held weakly, so wrapping the
//! same composite twice yields handles that share one proxy, and the cache
//! entry goes away with the last handle.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{trace, warn};

use super::list::TrackedList;
use super::map::TrackedMap;
use super::raw::{Entries, Fields, Items, Members, Target};
use super::record::TrackedRecord;
use super::set::TrackedSet;
use super::value::Value;
use crate::error::Result;
use crate::reactive::{batch, trigger, Field, TargetId};

/// Uniform access to any tracked composite, one field at a time.
pub trait Observable {
    /// Identity shared with the raw composite.
    fn target_id(&self) -> TargetId;

    /// Tracked read of one field. Structural fields read as the size.
    fn read(&self, field: &Field) -> Value;

    /// Write one field, propagating if the stored value changed.
    ///
    /// Fields the composite has no storage for (for example `Iterate`, or
    /// `Index` on a record) are not written; the call logs a warning and
    /// returns `Ok`.
    fn write(&self, field: Field, value: Value) -> Result<()>;
}

/// The instrumented view over a composite.
pub(crate) struct Proxy<D> {
    pub(crate) target: Arc<Target<D>>,
}

impl<D> Drop for Proxy<D> {
    fn drop(&mut self) {
        let id = self.target.id();
        proxies().remove_if(&id, |_, cached| cached.is_dead());
    }
}

pub(crate) enum CachedProxy {
    Record(Weak<Proxy<Fields>>),
    List(Weak<Proxy<Items>>),
    Map(Weak<Proxy<Entries>>),
    Set(Weak<Proxy<Members>>),
}

impl CachedProxy {
    fn is_dead(&self) -> bool {
        match self {
            CachedProxy::Record(weak) => weak.strong_count() == 0,
            CachedProxy::List(weak) => weak.strong_count() == 0,
            CachedProxy::Map(weak) => weak.strong_count() == 0,
            CachedProxy::Set(weak) => weak.strong_count() == 0,
        }
    }
}

/// Storage kinds that can be cached as a proxy.
pub(crate) trait ProxyKind: Sized + Send + Sync + 'static {
    fn store(proxy: &Arc<Proxy<Self>>) -> CachedProxy;
    fn load(cached: &CachedProxy) -> Option<Arc<Proxy<Self>>>;
}

impl ProxyKind for Fields {
    fn store(proxy: &Arc<Proxy<Self>>) -> CachedProxy {
        CachedProxy::Record(Arc::downgrade(proxy))
    }

    fn load(cached: &CachedProxy) -> Option<Arc<Proxy<Self>>> {
        match cached {
            CachedProxy::Record(weak) => weak.upgrade(),
            _ => None,
        }
    }
}

impl ProxyKind for Items {
    fn store(proxy: &Arc<Proxy<Self>>) -> CachedProxy {
        CachedProxy::List(Arc::downgrade(proxy))
    }

    fn load(cached: &CachedProxy) -> Option<Arc<Proxy<Self>>> {
        match cached {
            CachedProxy::List(weak) => weak.upgrade(),
            _ => None,
        }
    }
}

impl ProxyKind for Entries {
    fn store(proxy: &Arc<Proxy<Self>>) -> CachedProxy {
        CachedProxy::Map(Arc::downgrade(proxy))
    }

    fn load(cached: &CachedProxy) -> Option<Arc<Proxy<Self>>> {
        match cached {
            CachedProxy::Map(weak) => weak.upgrade(),
            _ => None,
        }
    }
}

impl ProxyKind for Members {
    fn store(proxy: &Arc<Proxy<Self>>) -> CachedProxy {
        CachedProxy::Set(Arc::downgrade(proxy))
    }

    fn load(cached: &CachedProxy) -> Option<Arc<Proxy<Self>>> {
        match cached {
            CachedProxy::Set(weak) => weak.upgrade(),
            _ => None,
        }
    }
}

fn proxies() -> &'static DashMap<TargetId, CachedProxy> {
    static PROXIES: OnceLock<DashMap<TargetId, CachedProxy>> = OnceLock::new();
    PROXIES.get_or_init(DashMap::new)
}

/// The live proxy for `target`, creating and caching one if needed.
pub(crate) fn proxy_for<D: ProxyKind>(target: &Arc<Target<D>>) -> Arc<Proxy<D>> {
    match proxies().entry(target.id()) {
        Entry::Occupied(mut entry) => {
            if let Some(proxy) = D::load(entry.get()) {
                return proxy;
            }
            let proxy = Arc::new(Proxy {
                target: target.clone(),
            });
            entry.insert(D::store(&proxy));
            proxy
        }
        Entry::Vacant(entry) => {
            let proxy = Arc::new(Proxy {
                target: target.clone(),
            });
            entry.insert(D::store(&proxy));
            trace!(id = ?target.id(), "created proxy");
            proxy
        }
    }
}

/// Number of composites with a live tracked view.
pub fn live_proxy_count() -> usize {
    proxies().iter().filter(|entry| !entry.value().is_dead()).count()
}

/// A tracked composite of any kind.
#[derive(Clone)]
pub enum Tracked {
    Record(TrackedRecord),
    List(TrackedList),
    Map(TrackedMap),
    Set(TrackedSet),
}

impl Tracked {
    pub fn target_id(&self) -> TargetId {
        match self {
            Tracked::Record(record) => record.id(),
            Tracked::List(list) => list.id(),
            Tracked::Map(map) => map.id(),
            Tracked::Set(set) => set.id(),
        }
    }

    /// The raw composite behind this view.
    pub fn to_raw(&self) -> Value {
        match self {
            Tracked::Record(record) => Value::Record(record.to_raw()),
            Tracked::List(list) => Value::List(list.to_raw()),
            Tracked::Map(map) => Value::Map(map.to_raw()),
            Tracked::Set(set) => Value::Set(set.to_raw()),
        }
    }

    /// Whether both handles are the same proxy.
    pub fn ptr_eq(&self, other: &Tracked) -> bool {
        match (self, other) {
            (Tracked::Record(a), Tracked::Record(b)) => a.ptr_eq(b),
            (Tracked::List(a), Tracked::List(b)) => a.ptr_eq(b),
            (Tracked::Map(a), Tracked::Map(b)) => a.ptr_eq(b),
            (Tracked::Set(a), Tracked::Set(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn as_observable(&self) -> &dyn Observable {
        match self {
            Tracked::Record(record) => record,
            Tracked::List(list) => list,
            Tracked::Map(map) => map,
            Tracked::Set(set) => set,
        }
    }
}

impl Observable for Tracked {
    fn target_id(&self) -> TargetId {
        Tracked::target_id(self)
    }

    fn read(&self, field: &Field) -> Value {
        self.as_observable().read(field)
    }

    fn write(&self, field: Field, value: Value) -> Result<()> {
        self.as_observable().write(field, value)
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracked::Record(record) => write!(f, "Tracked({:?})", record.to_raw()),
            Tracked::List(list) => write!(f, "Tracked({:?})", list.to_raw()),
            Tracked::Map(map) => write!(f, "Tracked({:?})", map.to_raw()),
            Tracked::Set(set) => write!(f, "Tracked({:?})", set.to_raw()),
        }
    }
}

impl From<TrackedRecord> for Value {
    fn from(record: TrackedRecord) -> Self {
        Value::Tracked(Tracked::Record(record))
    }
}

impl From<TrackedList> for Value {
    fn from(list: TrackedList) -> Self {
        Value::Tracked(Tracked::List(list))
    }
}

impl From<TrackedMap> for Value {
    fn from(map: TrackedMap) -> Self {
        Value::Tracked(Tracked::Map(map))
    }
}

impl From<TrackedSet> for Value {
    fn from(set: TrackedSet) -> Self {
        Value::Tracked(Tracked::Set(set))
    }
}

/// Wrap a value so reads through it are tracked and writes propagate.
///
/// Composites come back as their tracked view; the same composite always
/// yields the same proxy while any handle to it is alive. Primitives,
/// values that are already tracked, values marked raw and frozen values
/// are returned unchanged. Nested composites are wrapped lazily when read.
pub fn wrap(value: Value) -> Value {
    match value {
        Value::Record(record) if record.target().is_observable() => {
            TrackedRecord::from_proxy(proxy_for(record.target())).into()
        }
        Value::List(list) if list.target().is_observable() => {
            TrackedList::from_proxy(proxy_for(list.target())).into()
        }
        Value::Map(map) if map.target().is_observable() => {
            TrackedMap::from_proxy(proxy_for(map.target())).into()
        }
        Value::Set(set) if set.target().is_observable() => {
            TrackedSet::from_proxy(proxy_for(set.target())).into()
        }
        other => other,
    }
}

/// The raw composite behind a tracked view; anything else is unchanged.
pub fn to_raw(value: Value) -> Value {
    match value {
        Value::Tracked(tracked) => tracked.to_raw(),
        other => other,
    }
}

/// Exclude a composite from tracking. [`wrap`] will return it unchanged.
///
/// Views created before the mark keep working.
pub fn mark_raw(value: Value) -> Value {
    match &value {
        Value::Record(record) => record.target().mark_skip(),
        Value::List(list) => list.target().mark_skip(),
        Value::Map(map) => map.target().mark_skip(),
        Value::Set(set) => set.target().mark_skip(),
        Value::Tracked(Tracked::Record(record)) => record.to_raw().target().mark_skip(),
        Value::Tracked(Tracked::List(list)) => list.to_raw().target().mark_skip(),
        Value::Tracked(Tracked::Map(map)) => map.to_raw().target().mark_skip(),
        Value::Tracked(Tracked::Set(set)) => set.to_raw().target().mark_skip(),
        _ => {}
    }
    value
}

pub fn is_tracked(value: &Value) -> bool {
    matches!(value, Value::Tracked(_))
}

/// Trigger several fields of one target as a single batch.
pub(crate) fn trigger_fields<I>(target: TargetId, fields: I) -> Result<()>
where
    I: IntoIterator<Item = Field>,
{
    batch(move || fields.into_iter().try_for_each(|field| trigger(target, field)))?
}

/// Log and drop a write to a frozen composite.
pub(crate) fn reject_frozen(target: TargetId) {
    warn!(id = ?target, "write to frozen value ignored");
}

/// Log and drop a write to a field the composite does not store.
pub(crate) fn reject_field(target: TargetId, field: &Field) {
    warn!(id = ?target, field = ?field, "write to unsupported field ignored");
}

/// Size as a value, for structural reads through [`Observable::read`].
pub(crate) fn size_value(len: usize) -> Value {
    Value::Int(i64::try_from(len).unwrap_or(i64::MAX))
}
