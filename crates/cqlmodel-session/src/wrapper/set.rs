//! Tracked sets and set cursors.

use super::{Marker, Slot, no_current_element};
use cqlmodel_core::Result;
use std::collections::HashSet;
use std::hash::Hash;

/// A set attribute of a proxied entity.
#[derive(Debug)]
pub struct SetWrapper<'a, V> {
    items: Slot<'a, HashSet<V>>,
    marker: Marker,
}

impl<'a, V: Eq + Hash> SetWrapper<'a, V> {
    pub(crate) fn new(items: impl Into<Slot<'a, HashSet<V>>>, marker: Marker) -> Self {
        Self {
            items: items.into(),
            marker,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: &V) -> bool {
        self.items.contains(value)
    }

    pub fn iter(&self) -> std::collections::hash_set::Iter<'_, V> {
        self.items.iter()
    }

    /// Returns `true` if the value was not present.
    pub fn insert(&mut self, value: V) -> bool {
        self.marker.mark();
        self.items.insert(value)
    }

    pub fn remove(&mut self, value: &V) -> bool {
        self.marker.mark();
        self.items.remove(value)
    }

    pub fn take(&mut self, value: &V) -> Option<V> {
        self.marker.mark();
        self.items.take(value)
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = V>) {
        self.marker.mark();
        self.items.extend(values);
    }

    pub fn retain(&mut self, f: impl FnMut(&V) -> bool) {
        self.marker.mark();
        self.items.retain(f);
    }

    pub fn clear(&mut self) {
        self.marker.mark();
        self.items.clear();
    }

    /// A cursor over a snapshot of the current elements.
    pub fn cursor(&mut self) -> SetCursor<'_, V>
    where
        V: Clone,
    {
        let pending: Vec<V> = self.items.iter().cloned().collect();
        SetCursor {
            items: &mut *self.items,
            pending: pending.into_iter(),
            current: None,
            marker: &self.marker,
        }
    }
}

/// Cursor over a tracked set. `remove` drops the element last returned by
/// `next`.
#[derive(Debug)]
pub struct SetCursor<'b, V> {
    items: &'b mut HashSet<V>,
    pending: std::vec::IntoIter<V>,
    current: Option<V>,
    marker: &'b Marker,
}

impl<V: Eq + Hash> SetCursor<'_, V> {
    pub fn next(&mut self) -> Option<&V> {
        self.current = self.pending.next();
        self.current.as_ref()
    }

    pub fn remove(&mut self) -> Result<V> {
        let Some(current) = self.current.take() else {
            return Err(no_current_element(self.marker, "remove"));
        };
        self.marker.mark();
        Ok(self.items.take(&current).unwrap_or(current))
    }
}
