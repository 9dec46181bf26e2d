//! Entity proxies: a loaded entity plus the record of what changed on it.
//!
//! A proxy owns the real entity, a [`DirtyTracker`] and a snapshot of the
//! context it was loaded in. Writes go through the proxy so that every
//! mutated attribute lands in the dirty map; reads delegate straight to the
//! real entity through [`EntityProxy::get`].
//!
//! The real entity sits in a [`SharedEntity`] cell. Lifecycle events
//! deferred by a batch window hold the same cell, so what an interceptor
//! writes at the end of the window is what the proxy reads afterwards.
//!
//! Whether a value is managed is a type-level distinction: an operation that
//! needs a proxy takes `&mut EntityProxy<T>`, and operations that accept
//! either form take a [`Tracked<T>`].

use crate::dirty::DirtyTracker;
use crate::wrapper::{ListWrapper, MapWrapper, Marker, SetWrapper, Slot};
use cqlmodel_core::{
    Counter, Entity, EntityMeta, Error, Options, PropertyKind, PropertyMeta, Result,
    ValidationErrorKind, Value,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The real entity behind a proxy, shared with the lifecycle events a batch
/// window defers on it.
#[derive(Debug)]
pub(crate) struct SharedEntity<T>(Arc<Mutex<T>>);

impl<T: Entity> SharedEntity<T> {
    pub(crate) fn new(entity: T) -> Self {
        Self(Arc::new(Mutex::new(entity)))
    }

    /// A second handle on the same entity.
    pub(crate) fn handle(&self) -> Self {
        Self(Arc::clone(&self.0))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn snapshot(&self) -> T {
        self.lock().clone()
    }

    pub(crate) fn replace(&self, entity: T) {
        *self.lock() = entity;
    }

    /// Take one attribute out of the entity; it goes back when the slot
    /// drops. The lock is not held in between.
    fn slot<'s, C: Default + 's>(
        &'s self,
        access: impl Fn(&mut T) -> Option<&mut C> + 's,
    ) -> Option<Slot<'s, C>> {
        let taken = {
            let mut guard = self.lock();
            std::mem::take(access(&mut *guard)?)
        };
        Some(Slot::taken(taken, move |value| {
            let mut guard = self.lock();
            if let Some(home) = access(&mut *guard) {
                *home = value;
            }
        }))
    }

    /// The entity itself, or a copy of it while a deferred event still holds
    /// the cell.
    pub(crate) fn into_inner(self) -> T {
        match Arc::try_unwrap(self.0) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => Self(shared).snapshot(),
        }
    }
}

/// Read access to the real entity of a [`Tracked`] value.
///
/// For a proxy this holds the entity lock: drop it before ending a batch
/// window.
pub enum EntityRef<'a, T> {
    Locked(MutexGuard<'a, T>),
    Plain(&'a T),
}

impl<T> Deref for EntityRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            EntityRef::Locked(guard) => guard,
            EntityRef::Plain(entity) => entity,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for EntityRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (**self).fmt(f)
    }
}

/// What a proxy remembers about where it came from.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    meta: Arc<EntityMeta>,
    primary_key: Vec<Value>,
    options: Options,
}

impl ProxyContext {
    pub(crate) fn new(meta: Arc<EntityMeta>, primary_key: Vec<Value>, options: Options) -> Self {
        Self {
            meta,
            primary_key,
            options,
        }
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    /// Primary key the proxy was bound to, in declared component order.
    pub fn primary_key(&self) -> &[Value] {
        &self.primary_key
    }

    /// Options of the operation that produced the proxy.
    pub fn options(&self) -> Options {
        self.options
    }
}

/// Which container an accessor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Any,
    List,
    Set,
    Map,
}

impl Access {
    fn accepts(self, kind: PropertyKind) -> bool {
        match self {
            Access::Any => true,
            Access::List => kind == PropertyKind::List,
            Access::Set => kind == PropertyKind::Set,
            Access::Map => kind == PropertyKind::Map,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Access::Any => "value",
            Access::List => "list",
            Access::Set => "set",
            Access::Map => "map",
        }
    }
}

/// A managed entity.
#[derive(Debug)]
pub struct EntityProxy<T: Entity> {
    real: SharedEntity<T>,
    dirty: DirtyTracker,
    context: ProxyContext,
    loaded: HashSet<String>,
}

impl<T: Entity> EntityProxy<T> {
    #[cfg(test)]
    pub(crate) fn new<I>(real: T, context: ProxyContext, loaded: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self::from_shared(SharedEntity::new(real), context, loaded)
    }

    pub(crate) fn from_shared<I>(real: SharedEntity<T>, context: ProxyContext, loaded: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            real,
            dirty: DirtyTracker::new(),
            context,
            loaded: loaded.into_iter().collect(),
        }
    }

    /// The real entity.
    pub fn get(&self) -> EntityRef<'_, T> {
        EntityRef::Locked(self.real.lock())
    }

    pub fn context(&self) -> &ProxyContext {
        &self.context
    }

    pub fn meta(&self) -> &EntityMeta {
        &self.context.meta
    }

    pub fn primary_key(&self) -> &[Value] {
        &self.context.primary_key
    }

    /// Whether the attribute was read from the database or written through
    /// this proxy.
    pub fn is_loaded(&self, property: &str) -> bool {
        self.loaded.contains(property)
    }

    /// Names of the dirty attributes, sorted.
    pub fn dirty_properties(&self) -> Vec<String> {
        self.dirty.names()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Unwrap the real entity, dropping the tracking state.
    pub fn into_inner(self) -> T {
        self.real.into_inner()
    }

    /// Mutate one attribute through a closure.
    ///
    /// ```ignore
    /// proxy.set("name", |user| user.name = "jane".to_string())?;
    /// ```
    pub fn set<R>(&mut self, property: &str, mutate: impl FnOnce(&mut T) -> R) -> Result<R> {
        let pm = self.writable(property, Access::Any)?;
        let result = self.real.with(mutate);
        self.touch(&pm);
        Ok(result)
    }

    /// Write one attribute from a dynamic value.
    pub fn set_value(&mut self, property: &str, value: Value) -> Result<()> {
        let pm = self.writable(property, Access::Any)?;
        self.real.with(|real| real.write_value(pm.name(), value))?;
        self.touch(&pm);
        Ok(())
    }

    /// Tracked access to a list attribute.
    pub fn list<'s, V: 's>(
        &'s mut self,
        property: &str,
        access: impl Fn(&mut T) -> &mut Vec<V> + 's,
    ) -> Result<ListWrapper<'s, V>> {
        let (items, marker) = self.container(property, Access::List, access)?;
        Ok(ListWrapper::new(items, marker))
    }

    /// Tracked access to a set attribute.
    pub fn set_attr<'s, V: Eq + Hash + 's>(
        &'s mut self,
        property: &str,
        access: impl Fn(&mut T) -> &mut HashSet<V> + 's,
    ) -> Result<SetWrapper<'s, V>> {
        let (items, marker) = self.container(property, Access::Set, access)?;
        Ok(SetWrapper::new(items, marker))
    }

    /// Tracked access to a map attribute.
    pub fn map<'s, K: Eq + Hash + 's, V: 's>(
        &'s mut self,
        property: &str,
        access: impl Fn(&mut T) -> &mut HashMap<K, V> + 's,
    ) -> Result<MapWrapper<'s, K, V>> {
        let (entries, marker) = self.container(property, Access::Map, access)?;
        Ok(MapWrapper::new(entries, marker))
    }

    fn container<'s, C: Default + 's>(
        &'s mut self,
        property: &str,
        kind: Access,
        access: impl Fn(&mut T) -> &mut C + 's,
    ) -> Result<(Slot<'s, C>, Marker)> {
        let pm = self.writable(property, kind)?;
        self.loaded.insert(pm.name().to_string());
        let marker = Marker::new(self.dirty.clone(), pm);
        let slot = self
            .real
            .slot(move |real| Some(access(real)))
            .ok_or_else(|| Error::InvalidState(format!("No {} to wrap", kind.label())))?;
        Ok((slot, marker))
    }

    /// A counter cell. Counters bypass the dirty map: every increment or
    /// decrement is queued on the cell and flushed as its own statement.
    pub fn counter(&mut self, property: &str) -> Result<Slot<'_, Counter>> {
        let class = self.context.meta.class_name().to_string();
        if !self.context.meta.property(property)?.is_counter() {
            return Err(Error::InvalidState(format!(
                "The property '{property}' of entity '{class}' is not a counter"
            )));
        }
        let name = property.to_string();
        self.real
            .slot(move |real| real.counter_mut(&name))
            .ok_or_else(|| {
                Error::InvalidState(format!(
                    "The entity '{class}' exposes no counter cell for property '{property}'"
                ))
            })
    }

    fn writable(&self, property: &str, access: Access) -> Result<Arc<PropertyMeta>> {
        let meta = &self.context.meta;
        let pm = meta.property(property)?;
        let class = meta.class_name();
        if pm.kind().is_id() {
            return Err(Error::InvalidState(format!(
                "Cannot change the primary key '{property}' of entity '{class}' through its proxy"
            )));
        }
        if pm.is_counter() {
            return Err(Error::InvalidState(format!(
                "The counter property '{property}' of entity '{class}' should be changed through counter()"
            )));
        }
        if !pm.has_setter() {
            return Err(Error::InvalidState(format!(
                "The property '{property}' of entity '{class}' has no setter"
            )));
        }
        if !access.accepts(pm.kind()) {
            return Err(Error::InvalidState(format!(
                "The property '{property}' of entity '{class}' is not a {}",
                access.label()
            )));
        }
        Ok(Arc::clone(pm))
    }

    fn touch(&mut self, pm: &Arc<PropertyMeta>) {
        self.dirty.mark(pm);
        self.loaded.insert(pm.name().to_string());
    }

    pub(crate) fn dirty_tracker(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub(crate) fn real(&self) -> &SharedEntity<T> {
        &self.real
    }

    /// Swap in a freshly loaded entity. Pending changes are discarded.
    pub(crate) fn replace_real<I>(&mut self, real: T, loaded: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.real.replace(real);
        self.dirty.clear();
        self.loaded = loaded.into_iter().collect();
    }

    pub(crate) fn mark_loaded(&mut self, property: &str) {
        self.loaded.insert(property.to_string());
    }

    pub(crate) fn rebind_options(&mut self, options: Options) {
        self.context.options = options;
    }
}

// ============================================================================
// Tracked
// ============================================================================

/// An entity value that is either managed or not.
#[derive(Debug)]
pub enum Tracked<T: Entity> {
    Proxy(EntityProxy<T>),
    Bare(T),
}

impl<T: Entity> Tracked<T> {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Tracked::Proxy(_))
    }

    pub fn get(&self) -> EntityRef<'_, T> {
        match self {
            Tracked::Proxy(proxy) => proxy.get(),
            Tracked::Bare(entity) => EntityRef::Plain(entity),
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Tracked::Proxy(proxy) => proxy.into_inner(),
            Tracked::Bare(entity) => entity,
        }
    }

    pub fn as_proxy_mut(&mut self) -> Result<&mut EntityProxy<T>> {
        match self {
            Tracked::Proxy(proxy) => Ok(proxy),
            Tracked::Bare(_) => Err(not_proxy::<T>()),
        }
    }

    pub fn into_proxy(self) -> Result<EntityProxy<T>> {
        match self {
            Tracked::Proxy(proxy) => Ok(proxy),
            Tracked::Bare(_) => Err(not_proxy::<T>()),
        }
    }
}

fn not_proxy<T>() -> Error {
    Error::validation(
        "entity",
        ValidationErrorKind::NotProxy,
        format!(
            "The entity '{}' is not in 'managed' state",
            std::any::type_name::<T>()
        ),
    )
}

impl<T: Entity> From<T> for Tracked<T> {
    fn from(entity: T) -> Self {
        Tracked::Bare(entity)
    }
}

impl<T: Entity> From<EntityProxy<T>> for Tracked<T> {
    fn from(proxy: EntityProxy<T>) -> Self {
        Tracked::Proxy(proxy)
    }
}
