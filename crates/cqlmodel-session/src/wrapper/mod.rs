//! Dirty-tracking container wrappers.
//!
//! Each wrapper holds the real container of the entity through a [`Slot`]
//! and exposes the same operations. Mutating operations record the owning property in
//! the proxy's [`DirtyTracker`] before delegating; reads never do. Views
//! taken from a wrapper (sub-lists, cursors, key and value views) carry the
//! same tracking.

mod list;
mod map;
mod set;

pub use list::{ListCursor, ListWrapper, SubList};
pub use map::{EntryCursor, KeySetView, MapWrapper, ValuesView};
pub use set::{SetCursor, SetWrapper};

use crate::dirty::DirtyTracker;
use cqlmodel_core::PropertyMeta;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Mutable access to one attribute of an entity.
///
/// A slot either borrows the attribute in place, or holds it taken out of an
/// entity that deferred lifecycle events also hold; the value goes back into
/// the entity when the slot drops.
pub struct Slot<'a, C: Default> {
    value: SlotValue<'a, C>,
}

enum SlotValue<'a, C: Default> {
    Borrowed(&'a mut C),
    Taken {
        value: C,
        restore: Option<Box<dyn FnOnce(C) + 'a>>,
    },
}

impl<'a, C: Default> Slot<'a, C> {
    pub(crate) fn borrowed(value: &'a mut C) -> Self {
        Self {
            value: SlotValue::Borrowed(value),
        }
    }

    pub(crate) fn taken(value: C, restore: impl FnOnce(C) + 'a) -> Self {
        Self {
            value: SlotValue::Taken {
                value,
                restore: Some(Box::new(restore)),
            },
        }
    }
}

impl<'a, C: Default> From<&'a mut C> for Slot<'a, C> {
    fn from(value: &'a mut C) -> Self {
        Self::borrowed(value)
    }
}

impl<C: Default> Deref for Slot<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        match &self.value {
            SlotValue::Borrowed(value) => value,
            SlotValue::Taken { value, .. } => value,
        }
    }
}

impl<C: Default> DerefMut for Slot<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        match &mut self.value {
            SlotValue::Borrowed(value) => value,
            SlotValue::Taken { value, .. } => value,
        }
    }
}

impl<C: Default> Drop for Slot<'_, C> {
    fn drop(&mut self) {
        if let SlotValue::Taken { value, restore } = &mut self.value {
            if let Some(restore) = restore.take() {
                restore(std::mem::take(value));
            }
        }
    }
}

impl<C: Default + fmt::Debug> fmt::Debug for Slot<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&**self).finish()
    }
}

/// The property a wrapper stands for, plus the tracker it writes to.
#[derive(Debug, Clone)]
pub(crate) struct Marker {
    tracker: DirtyTracker,
    property: Arc<PropertyMeta>,
}

impl Marker {
    pub(crate) fn new(tracker: DirtyTracker, property: Arc<PropertyMeta>) -> Self {
        Self { tracker, property }
    }

    pub(crate) fn mark(&self) {
        self.tracker.mark(&self.property);
    }

    pub(crate) fn property(&self) -> &PropertyMeta {
        &self.property
    }
}

/// Error raised when a cursor mutation is not preceded by `next`.
fn no_current_element(marker: &Marker, operation: &str) -> cqlmodel_core::Error {
    cqlmodel_core::Error::InvalidState(format!(
        "Cannot {operation} on the cursor of property '{}': next() has not returned an element",
        marker.property().name()
    ))
}


#[cfg(test)]
pub(crate) fn test_marker(name: &str, kind: cqlmodel_core::PropertyKind) -> (Marker, DirtyTracker) {
    use cqlmodel_core::CqlType;

    let cql_type = match kind {
        cqlmodel_core::PropertyKind::List => CqlType::List(Box::new(CqlType::Text)),
        cqlmodel_core::PropertyKind::Set => CqlType::Set(Box::new(CqlType::Text)),
        cqlmodel_core::PropertyKind::Map => {
            CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Text))
        }
        _ => CqlType::Text,
    };
    let property = PropertyMeta::builder(name, kind, cql_type)
        .build("CompleteBean")
        .unwrap();
    let tracker = DirtyTracker::new();
    (Marker::new(tracker.clone(), Arc::new(property)), tracker)
}
