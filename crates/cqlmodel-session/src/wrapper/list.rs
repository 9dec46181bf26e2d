//! Tracked lists, sub-list windows and list cursors.

use super::{Marker, Slot, no_current_element};
use cqlmodel_core::Result;
use std::ops::Range;

/// A list attribute of a proxied entity.
#[derive(Debug)]
pub struct ListWrapper<'a, V> {
    items: Slot<'a, Vec<V>>,
    marker: Marker,
}

impl<'a, V> ListWrapper<'a, V> {
    pub(crate) fn new(items: impl Into<Slot<'a, Vec<V>>>, marker: Marker) -> Self {
        Self {
            items: items.into(),
            marker,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&V> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&V> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[V] {
        &self.items
    }

    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.items.contains(value)
    }

    pub fn index_of(&self, value: &V) -> Option<usize>
    where
        V: PartialEq,
    {
        self.items.iter().position(|v| v == value)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn push(&mut self, value: V) {
        self.marker.mark();
        self.items.push(value);
    }

    /// Insert at `index`, shifting later elements.
    ///
    /// Panics if `index > len`, like [`Vec::insert`].
    pub fn insert(&mut self, index: usize, value: V) {
        self.marker.mark();
        self.items.insert(index, value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = V>) {
        self.marker.mark();
        self.items.extend(values);
    }

    /// Insert every value starting at `index`, keeping their order.
    pub fn insert_all(&mut self, index: usize, values: impl IntoIterator<Item = V>) {
        self.marker.mark();
        self.items.splice(index..index, values);
    }

    /// Remove the element at `index`.
    ///
    /// Panics if `index >= len`, like [`Vec::remove`].
    pub fn remove(&mut self, index: usize) -> V {
        self.marker.mark();
        self.items.remove(index)
    }

    /// Remove the first element equal to `value`.
    pub fn remove_item(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.marker.mark();
        match self.items.iter().position(|v| v == value) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<V> {
        self.marker.mark();
        self.items.pop()
    }

    pub fn retain(&mut self, f: impl FnMut(&V) -> bool) {
        self.marker.mark();
        self.items.retain(f);
    }

    /// Replace the element at `index`, returning the previous one.
    ///
    /// Out-of-range indexes leave the list untouched and return `None`.
    pub fn set(&mut self, index: usize, value: V) -> Option<V> {
        let slot = self.items.get_mut(index)?;
        self.marker.mark();
        Some(std::mem::replace(slot, value))
    }

    pub fn clear(&mut self) {
        self.marker.mark();
        self.items.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.marker.mark();
        self.items.truncate(len);
    }

    pub fn sort(&mut self)
    where
        V: Ord,
    {
        self.marker.mark();
        self.items.sort();
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&V, &V) -> std::cmp::Ordering) {
        self.marker.mark();
        self.items.sort_by(compare);
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// A tracked window over `range`.
    ///
    /// Panics if the range is out of bounds, like slicing.
    pub fn sub_list(&mut self, range: Range<usize>) -> SubList<'_, V> {
        assert!(
            range.start <= range.end && range.end <= self.items.len(),
            "sub-list range {range:?} out of bounds for length {}",
            self.items.len()
        );
        SubList {
            items: &mut *self.items,
            start: range.start,
            end: range.end,
            marker: &self.marker,
        }
    }

    /// A cursor positioned before the first element.
    pub fn cursor(&mut self) -> ListCursor<'_, V> {
        ListCursor {
            items: &mut *self.items,
            next: 0,
            last: None,
            marker: &self.marker,
        }
    }
}

/// A window over part of a tracked list.
///
/// Indexes are relative to the window. Structural changes move the end of
/// the window with them.
#[derive(Debug)]
pub struct SubList<'b, V> {
    items: &'b mut Vec<V>,
    start: usize,
    end: usize,
    marker: &'b Marker,
}

impl<V> SubList<'_, V> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.as_slice().get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.as_slice().iter()
    }

    pub fn as_slice(&self) -> &[V] {
        &self.items[self.start..self.end]
    }

    /// Append at the end of the window.
    pub fn push(&mut self, value: V) {
        self.marker.mark();
        self.items.insert(self.end, value);
        self.end += 1;
    }

    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: V) {
        assert!(index <= self.len(), "insertion index {index} out of bounds");
        self.marker.mark();
        self.items.insert(self.start + index, value);
        self.end += 1;
    }

    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> V {
        assert!(index < self.len(), "removal index {index} out of bounds");
        self.marker.mark();
        self.end -= 1;
        self.items.remove(self.start + index)
    }

    pub fn set(&mut self, index: usize, value: V) -> Option<V> {
        if index >= self.len() {
            return None;
        }
        self.marker.mark();
        Some(std::mem::replace(&mut self.items[self.start + index], value))
    }

    /// Remove every element of the window from the underlying list.
    pub fn clear(&mut self) {
        self.marker.mark();
        self.items.drain(self.start..self.end);
        self.end = self.start;
    }

    pub fn sort(&mut self)
    where
        V: Ord,
    {
        self.marker.mark();
        self.items[self.start..self.end].sort();
    }
}

/// Bidirectional-style cursor over a tracked list.
///
/// `remove` and `set` act on the element last returned by `next`.
#[derive(Debug)]
pub struct ListCursor<'b, V> {
    items: &'b mut Vec<V>,
    next: usize,
    last: Option<usize>,
    marker: &'b Marker,
}

impl<V> ListCursor<'_, V> {
    pub fn has_next(&self) -> bool {
        self.next < self.items.len()
    }

    /// Index of the element `next` would return.
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn next(&mut self) -> Option<&V> {
        let index = self.next;
        let value = self.items.get(index)?;
        self.last = Some(index);
        self.next += 1;
        Some(value)
    }

    pub fn remove(&mut self) -> Result<V> {
        let Some(index) = self.last.take() else {
            return Err(no_current_element(self.marker, "remove"));
        };
        self.marker.mark();
        self.next = index;
        Ok(self.items.remove(index))
    }

    pub fn set(&mut self, value: V) -> Result<V> {
        let Some(index) = self.last else {
            return Err(no_current_element(self.marker, "set"));
        };
        self.marker.mark();
        Ok(std::mem::replace(&mut self.items[index], value))
    }

    /// Insert before the element `next` would return.
    pub fn add(&mut self, value: V) {
        self.marker.mark();
        self.items.insert(self.next, value);
        self.next += 1;
        self.last = None;
    }
}
