//! Tracked maps with their key, value and entry views.

use super::{Marker, Slot, no_current_element};
use cqlmodel_core::Result;
use std::collections::HashMap;
use std::collections::hash_map;
use std::hash::Hash;

/// A map attribute of a proxied entity.
#[derive(Debug)]
pub struct MapWrapper<'a, K, V> {
    entries: Slot<'a, HashMap<K, V>>,
    marker: Marker,
}

impl<'a, K: Eq + Hash, V> MapWrapper<'a, K, V> {
    pub(crate) fn new(entries: impl Into<Slot<'a, HashMap<K, V>>>, marker: Marker) -> Self {
        Self {
            entries: entries.into(),
            marker,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.marker.mark();
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.marker.mark();
        self.entries.remove(key)
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (K, V)>) {
        self.marker.mark();
        self.entries.extend(entries);
    }

    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.marker.mark();
        self.entries.retain(f);
    }

    pub fn clear(&mut self) {
        self.marker.mark();
        self.entries.clear();
    }

    /// Mutable access to one value. Marks the property dirty only when the
    /// key exists.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let value = self.entries.get_mut(key)?;
        self.marker.mark();
        Some(value)
    }

    /// View over the keys. Removing a key removes its entry.
    pub fn key_set(&mut self) -> KeySetView<'_, K, V> {
        KeySetView {
            entries: &mut *self.entries,
            marker: &self.marker,
        }
    }

    /// View over the values. Removing a value removes its entry.
    pub fn values(&mut self) -> ValuesView<'_, K, V> {
        ValuesView {
            entries: &mut *self.entries,
            marker: &self.marker,
        }
    }

    /// A cursor over a snapshot of the current keys.
    pub fn cursor(&mut self) -> EntryCursor<'_, K, V>
    where
        K: Clone,
    {
        let keys: Vec<K> = self.entries.keys().cloned().collect();
        EntryCursor {
            entries: &mut *self.entries,
            keys: keys.into_iter(),
            current: None,
            marker: &self.marker,
        }
    }
}

/// Key view of a tracked map.
#[derive(Debug)]
pub struct KeySetView<'b, K, V> {
    entries: &'b mut HashMap<K, V>,
    marker: &'b Marker,
}

impl<K: Eq + Hash, V> KeySetView<'_, K, V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> hash_map::Keys<'_, K, V> {
        self.entries.keys()
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.marker.mark();
        self.entries.remove(key).is_some()
    }

    pub fn retain(&mut self, mut f: impl FnMut(&K) -> bool) {
        self.marker.mark();
        self.entries.retain(|k, _| f(k));
    }

    pub fn clear(&mut self) {
        self.marker.mark();
        self.entries.clear();
    }
}

/// Value view of a tracked map.
#[derive(Debug)]
pub struct ValuesView<'b, K, V> {
    entries: &'b mut HashMap<K, V>,
    marker: &'b Marker,
}

impl<K: Eq + Hash, V> ValuesView<'_, K, V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.entries.values().any(|v| v == value)
    }

    pub fn iter(&self) -> hash_map::Values<'_, K, V> {
        self.entries.values()
    }

    /// Remove one entry holding `value`.
    pub fn remove(&mut self, value: &V) -> bool
    where
        K: Clone,
        V: PartialEq,
    {
        self.marker.mark();
        let key = self
            .entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn retain(&mut self, mut f: impl FnMut(&V) -> bool) {
        self.marker.mark();
        self.entries.retain(|_, v| f(v));
    }

    pub fn clear(&mut self) {
        self.marker.mark();
        self.entries.clear();
    }
}

/// Cursor over the entries of a tracked map.
///
/// `remove` and `set_value` act on the entry last returned by `next`.
#[derive(Debug)]
pub struct EntryCursor<'b, K, V> {
    entries: &'b mut HashMap<K, V>,
    keys: std::vec::IntoIter<K>,
    current: Option<K>,
    marker: &'b Marker,
}

impl<K: Eq + Hash, V> EntryCursor<'_, K, V> {
    pub fn next(&mut self) -> Option<(&K, &V)> {
        loop {
            let key = self.keys.next()?;
            if self.entries.contains_key(&key) {
                self.current = Some(key);
                break;
            }
        }
        let key = self.current.as_ref()?;
        self.entries.get_key_value(key)
    }

    pub fn remove(&mut self) -> Result<V> {
        let Some(key) = self.current.take() else {
            return Err(no_current_element(self.marker, "remove"));
        };
        match self.entries.remove(&key) {
            Some(value) => {
                self.marker.mark();
                Ok(value)
            }
            None => Err(no_current_element(self.marker, "remove")),
        }
    }

    pub fn set_value(&mut self, value: V) -> Result<V> {
        let slot = match &self.current {
            Some(key) => self.entries.get_mut(key),
            None => None,
        };
        let Some(slot) = slot else {
            return Err(no_current_element(self.marker, "set a value"));
        };
        self.marker.mark();
        Ok(std::mem::replace(slot, value))
    }
}
