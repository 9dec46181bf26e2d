//! Cache of dynamically prepared statements.
//!
//! Update statements depend on which properties are dirty, so they cannot
//! all be prepared up front. They are prepared on first use and cached by
//! (entity class, sorted property names).

use cqlmodel_core::PreparedStatement;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Identity of a dynamically prepared statement.
///
/// Lookups compare the whole key, so two property sets never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    class_name: String,
    properties: Vec<String>,
}

impl StatementKey {
    /// Property names are sorted, so the order they were marked in does not
    /// matter.
    pub fn new<I, P>(class_name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut properties: Vec<String> = properties.into_iter().map(Into::into).collect();
        properties.sort();
        Self {
            class_name: class_name.into(),
            properties,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }
}

impl fmt::Display for StatementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.class_name, self.properties.join(","))
    }
}

/// A cached prepared statement.
#[derive(Debug, Clone)]
pub struct CachedStatement {
    /// The prepared handle.
    pub prepared: PreparedStatement,
    /// When this entry was last accessed.
    pub last_used: Instant,
    /// Number of times this statement has been reused.
    pub hit_count: u64,
}

/// LRU-style cache for prepared statements.
///
/// When the cache exceeds `max_size`, the least-recently-used entry is evicted.
#[derive(Debug)]
pub struct PreparedStatementCache {
    cache: HashMap<StatementKey, CachedStatement>,
    max_size: usize,
}

impl PreparedStatementCache {
    /// Create a new cache with the given maximum number of entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(256)),
            max_size,
        }
    }

    /// Get a cached statement, refreshing its LRU position.
    pub fn get(&mut self, key: &StatementKey) -> Option<PreparedStatement> {
        let entry = self.cache.get_mut(key)?;
        entry.last_used = Instant::now();
        entry.hit_count += 1;
        Some(entry.prepared.clone())
    }

    /// Insert a statement, evicting the least-recently-used entry if full.
    pub fn insert(&mut self, key: StatementKey, prepared: PreparedStatement) {
        if self.max_size == 0 {
            return;
        }
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        self.cache.insert(
            key,
            CachedStatement {
                prepared,
                last_used: Instant::now(),
                hit_count: 0,
            },
        );
    }

    /// Check if a statement is cached.
    pub fn contains(&self, key: &StatementKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Evict the least-recently-used entry.
    fn evict_lru(&mut self) {
        let lru = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = lru {
            tracing::trace!(%key, "Evicting prepared statement from cache");
            self.cache.remove(&key);
        }
    }
}

impl Default for PreparedStatementCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ps(id: u64) -> PreparedStatement {
        PreparedStatement::new(
            id,
            format!("UPDATE t USING TTL :ttl SET c{id}=:c{id} WHERE id=:id;"),
        )
    }

    fn key(properties: &[&str]) -> StatementKey {
        StatementKey::new("User", properties.iter().copied())
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let mut cache = PreparedStatementCache::new(10);
        assert!(cache.get(&key(&["a"])).is_none());

        cache.insert(key(&["a"]), ps(1));
        assert!(cache.contains(&key(&["a"])));
        assert_eq!(cache.get(&key(&["a"])).map(|p| p.id()), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_eviction() {
        let mut cache = PreparedStatementCache::new(2);
        cache.insert(key(&["a"]), ps(1));
        std::thread::sleep(std::time::Duration::from_millis(1));
        cache.insert(key(&["b"]), ps(2));
        std::thread::sleep(std::time::Duration::from_millis(1));

        // Touch a so b becomes the LRU entry
        cache.get(&key(&["a"]));
        std::thread::sleep(std::time::Duration::from_millis(1));

        cache.insert(key(&["c"]), ps(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key(&["a"])));
        assert!(!cache.contains(&key(&["b"])));
        assert!(cache.contains(&key(&["c"])));
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let mut cache = PreparedStatementCache::new(0);
        cache.insert(key(&["a"]), ps(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_ignores_marking_order() {
        assert_eq!(key(&["name", "age"]), key(&["age", "name"]));
        assert_eq!(key(&["name", "age"]).properties(), &["age", "name"]);
        assert_eq!(key(&["name", "age"]).to_string(), "User[age,name]");
    }

    #[test]
    fn test_entries_never_shared_across_keys() {
        let mut cache = PreparedStatementCache::default();
        cache.insert(key(&["age", "name"]), ps(1));
        cache.insert(key(&["name"]), ps(2));
        cache.insert(StatementKey::new("Tweet", ["age", "name"]), ps(3));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&key(&["name", "age"])).map(|p| p.id()), Some(1));
        assert_eq!(cache.get(&key(&["name"])).map(|p| p.id()), Some(2));
        assert_eq!(
            cache
                .get(&StatementKey::new("Tweet", ["name", "age"]))
                .map(|p| p.id()),
            Some(3)
        );
        assert!(cache.get(&key(&["age"])).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }
}
