//! Dirty tracking: which attributes changed since load.

use cqlmodel_core::PropertyMeta;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Attributes touched during one edit session, keyed by property name.
///
/// Marking the same property twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct DirtyMap {
    entries: HashMap<String, Arc<PropertyMeta>>,
}

impl DirtyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a touched property. Returns `true` if it was not dirty yet.
    pub fn mark(&mut self, property: &Arc<PropertyMeta>) -> bool {
        if self.entries.contains_key(property.name()) {
            return false;
        }
        self.entries
            .insert(property.name().to_string(), Arc::clone(property));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Dirty properties sorted by name.
    pub fn properties(&self) -> Vec<Arc<PropertyMeta>> {
        let mut properties: Vec<_> = self.entries.values().cloned().collect();
        properties.sort_by(|a, b| a.name().cmp(b.name()));
        properties
    }

    /// Dirty property names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Shared handle on a [`DirtyMap`].
///
/// A proxy and every container wrapper it hands out hold a clone of the
/// same tracker, so a mutation through any of them lands in one map.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    map: Arc<Mutex<DirtyMap>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<R>(&self, f: impl FnOnce(&mut DirtyMap) -> R) -> R {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut map)
    }

    /// Record a touched property.
    pub fn mark(&self, property: &Arc<PropertyMeta>) {
        let added = self.with_map(|map| map.mark(property));
        if added {
            tracing::trace!(
                entity = property.entity_class(),
                property = property.name(),
                "Marked property dirty"
            );
        }
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.with_map(|map| map.contains(name))
    }

    pub fn len(&self) -> usize {
        self.with_map(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.with_map(|map| map.is_empty())
    }

    pub fn clear(&self) {
        self.with_map(DirtyMap::clear);
    }

    /// Dirty properties sorted by name.
    pub fn properties(&self) -> Vec<Arc<PropertyMeta>> {
        self.with_map(|map| map.properties())
    }

    pub fn names(&self) -> Vec<String> {
        self.with_map(|map| map.names())
    }

    /// Drain the map, returning the dirty properties sorted by name.
    pub fn take(&self) -> Vec<Arc<PropertyMeta>> {
        self.with_map(|map| {
            let properties = map.properties();
            map.clear();
            properties
        })
    }
}
