//! The parse cache.
//!
//! Cached entries are `Arc<OnceCell<..>>` cells rather than parsed trees:
//! concurrent async renders referencing the same file share one cell and at
//! most one of them runs the parse, the rest await its completion. The
//! default store is a bounded [`Lru`]; callers can substitute their own
//! [`CacheStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::parser::Template;

/// A cache entry: a cell that resolves to the parsed template list.
pub type CachedTemplates = Arc<OnceCell<Arc<Vec<Template>>>>;

/// Pluggable storage for the parse cache.
pub trait CacheStore: Send + Sync {
    /// Reads an entry, marking it recently used.
    fn read(&self, key: &str) -> Option<CachedTemplates>;

    /// Writes an entry.
    fn write(&self, key: &str, value: CachedTemplates);

    /// Removes an entry; used to evict failed parses.
    fn remove(&self, key: &str);

    /// Returns the existing entry or atomically installs `fresh`.
    fn read_or_insert(&self, key: &str, fresh: CachedTemplates) -> CachedTemplates {
        if let Some(existing) = self.read(key) {
            return existing;
        }
        self.write(key, fresh.clone());
        fresh
    }
}

/// A bounded least-recently-used map.
///
/// A zero limit is a valid no-op cache: writes are accepted and retain
/// nothing.
#[derive(Debug)]
pub struct Lru<V> {
    limit: usize,
    inner: Mutex<LruInner<V>>,
}

#[derive(Debug)]
struct LruInner<V> {
    map: HashMap<String, V>,
    /// Keys ordered least to most recently used.
    order: Vec<String>,
}

impl<V: Clone> Lru<V> {
    /// Creates an LRU holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inner: Mutex::new(LruInner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// The configured capacity.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru poisoned").map.len()
    }

    /// True when the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads and touches an entry.
    pub fn read(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().expect("lru poisoned");
        let value = inner.map.get(key).cloned()?;
        touch(&mut inner.order, key);
        Some(value)
    }

    /// Inserts an entry, evicting the least recently used past the limit.
    pub fn write(&self, key: &str, value: V) {
        if self.limit == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("lru poisoned");
        inner.map.insert(key.to_string(), value);
        touch(&mut inner.order, key);
        while inner.map.len() > self.limit {
            let oldest = inner.order.remove(0);
            inner.map.remove(&oldest);
        }
    }

    /// Removes an entry.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock().expect("lru poisoned");
        inner.map.remove(key);
        inner.order.retain(|k| k != key);
    }

    /// Reads the entry or installs `fresh`, in one critical section.
    pub fn read_or_insert(&self, key: &str, fresh: V) -> V {
        let mut inner = self.inner.lock().expect("lru poisoned");
        if let Some(existing) = inner.map.get(key).cloned() {
            touch(&mut inner.order, key);
            return existing;
        }
        if self.limit > 0 {
            inner.map.insert(key.to_string(), fresh.clone());
            touch(&mut inner.order, key);
            while inner.map.len() > self.limit {
                let oldest = inner.order.remove(0);
                inner.map.remove(&oldest);
            }
        }
        fresh
    }
}

/// Moves `key` to the most-recently-used position.
fn touch(order: &mut Vec<String>, key: &str) {
    order.retain(|k| k != key);
    order.push(key.to_string());
}

impl CacheStore for Lru<CachedTemplates> {
    fn read(&self, key: &str) -> Option<CachedTemplates> {
        Self::read(self, key)
    }

    fn write(&self, key: &str, value: CachedTemplates) {
        Self::write(self, key, value);
    }

    fn remove(&self, key: &str) {
        Self::remove(self, key);
    }

    fn read_or_insert(&self, key: &str, fresh: CachedTemplates) -> CachedTemplates {
        Self::read_or_insert(self, key, fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let lru: Lru<i32> = Lru::new(2);
        lru.write("a", 1);
        lru.write("b", 2);
        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(lru.read("a"), Some(1));
        lru.write("c", 3);
        assert_eq!(lru.len(), 2);
        assert_eq!(lru.read("b"), None);
        assert_eq!(lru.read("a"), Some(1));
        assert_eq!(lru.read("c"), Some(3));
    }

    #[test]
    fn test_write_updates_existing_key() {
        let lru: Lru<i32> = Lru::new(2);
        lru.write("a", 1);
        lru.write("a", 2);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.read("a"), Some(2));
    }

    #[test]
    fn test_zero_limit_is_noop() {
        let lru: Lru<i32> = Lru::new(0);
        lru.write("a", 1);
        assert!(lru.is_empty());
        assert_eq!(lru.read("a"), None);
        // read_or_insert hands back the fresh value without retaining it
        assert_eq!(lru.read_or_insert("a", 9), 9);
        assert!(lru.is_empty());
    }

    #[test]
    fn test_remove() {
        let lru: Lru<i32> = Lru::new(2);
        lru.write("a", 1);
        lru.remove("a");
        assert_eq!(lru.read("a"), None);
    }

    #[test]
    fn test_read_or_insert_returns_existing() {
        let lru: Lru<i32> = Lru::new(2);
        lru.write("a", 1);
        assert_eq!(lru.read_or_insert("a", 9), 1);
    }
}
