//! Entity trait, counter cells and lifecycle interception.
//!
//! The `Entity` trait is the accessor layer between the persistence pipeline
//! and a user type: reading attribute values, writing one attribute back,
//! and exposing the primary key and the counter cells.

use crate::error::{Error, Result};
use crate::metadata::EntityMeta;
use crate::row::Row;
use crate::value::Value;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for types that can be mapped to a CQL table.
///
/// Metadata derivation is not done here: `entity_meta` hands back a
/// descriptor built with [`EntityMeta::builder`].
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    /// Build the entity descriptor. Called once at registration.
    fn entity_meta() -> Result<EntityMeta>;

    /// Current values of the mapped non-counter attributes, keyed by
    /// property name. The primary key is read through `primary_key`.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Write one attribute.
    fn write_value(&mut self, property: &str, value: Value) -> Result<()>;

    /// Primary key components, in declared order.
    fn primary_key(&self) -> Vec<Value>;

    /// An empty instance holding only the given primary key.
    fn with_primary_key(key: &[Value]) -> Result<Self>;

    /// Decode an instance from a row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Access a counter cell by property name.
    fn counter_mut(&mut self, _property: &str) -> Option<&mut Counter> {
        None
    }

    /// Current value of one attribute.
    fn value_of(&self, property: &str) -> Option<Value> {
        self.to_values()
            .into_iter()
            .find(|(name, _)| *name == property)
            .map(|(_, value)| value)
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Entity-side counter cell.
///
/// Counters have no final value to write: every increment or decrement is
/// queued as its own delta and becomes one statement at flush time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    loaded: Option<i64>,
    pending: Vec<i64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter holding a value read from the database.
    pub fn from_loaded(value: i64) -> Self {
        Self {
            loaded: Some(value),
            pending: Vec::new(),
        }
    }

    pub fn incr(&mut self) {
        self.incr_by(1);
    }

    pub fn decr(&mut self) {
        self.decr_by(1);
    }

    pub fn incr_by(&mut self, delta: i64) {
        self.pending.push(delta);
    }

    pub fn decr_by(&mut self, delta: i64) {
        self.pending.push(-delta);
    }

    /// Loaded value plus pending deltas, or `None` if nothing was loaded
    /// or queued.
    pub fn get(&self) -> Option<i64> {
        if self.loaded.is_none() && self.pending.is_empty() {
            return None;
        }
        Some(self.loaded.unwrap_or(0) + self.pending.iter().sum::<i64>())
    }

    /// Replace the loaded value, keeping pending deltas.
    pub fn set_loaded(&mut self, value: Option<i64>) {
        self.loaded = value;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain the queued deltas, folding them into the loaded value.
    pub fn take_pending(&mut self) -> Vec<i64> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.loaded = Some(self.loaded.unwrap_or(0) + pending.iter().sum::<i64>());
        }
        pending
    }
}

// ============================================================================
// Lifecycle interception
// ============================================================================

/// Lifecycle events an interceptor can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
    PostLoad,
}

/// Callback invoked on an entity around persistence operations.
pub trait Interceptor<T>: Send + Sync + 'static {
    /// Events this interceptor wants to see.
    fn events(&self) -> &[Event];

    fn on_event(&self, entity: &mut T, event: Event) -> Result<()>;
}

/// Interceptor with the entity type erased, stored inside [`EntityMeta`].
pub(crate) trait ErasedInterceptor: Send + Sync {
    fn accepts(&self, event: Event) -> bool;

    fn invoke(&self, entity: &mut dyn Any, event: Event) -> Result<()>;
}

struct TypedInterceptor<T, I> {
    inner: I,
    _entity: PhantomData<fn(&mut T)>,
}

impl<T, I> ErasedInterceptor for TypedInterceptor<T, I>
where
    T: 'static,
    I: Interceptor<T>,
{
    fn accepts(&self, event: Event) -> bool {
        self.inner.events().contains(&event)
    }

    fn invoke(&self, entity: &mut dyn Any, event: Event) -> Result<()> {
        match entity.downcast_mut::<T>() {
            Some(entity) => self.inner.on_event(entity, event),
            None => Err(Error::InvalidState(format!(
                "interceptor for '{}' invoked with another entity type",
                std::any::type_name::<T>()
            ))),
        }
    }
}

pub(crate) fn erase<T, I>(interceptor: I) -> Arc<dyn ErasedInterceptor>
where
    T: 'static,
    I: Interceptor<T>,
{
    Arc::new(TypedInterceptor {
        inner: interceptor,
        _entity: PhantomData,
    })
}
