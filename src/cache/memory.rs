//! In-process cache backend
//!
//! Entries carry their own TTL and are evicted lazily when read after
//! expiry. There is no size bound and no background sweep.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{BackendKind, CacheBackend, CacheError};

/// Cache entry with the instant it was stored and its TTL
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Expiring in-memory store shared across request handlers
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(Instant::now()),
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set_value(&self, key: &str, value: Value, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
    }

    pub fn clear_all(&self) {
        self.entries.lock().clear();
    }

    /// Includes entries that have expired but not been read since.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.get_value(key))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.set_value(key, value, ttl);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.clear_all();
        Ok(())
    }

    async fn entry_count(&self) -> Option<usize> {
        Some(self.len())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get() {
        let store = MemoryStore::new();
        store.set_value("k", json!(["result1", "result2"]), Duration::from_secs(60));
        assert_eq!(store.get_value("k"), Some(json!(["result1", "result2"])));
    }

    #[test]
    fn test_miss() {
        let store = MemoryStore::new();
        assert_eq!(store.get_value("nonexistent"), None);
    }

    #[test]
    fn test_overwrite_replaces_value_and_ttl() {
        let store = MemoryStore::new();
        store.set_value("k", json!(1), Duration::from_millis(1));
        store.set_value("k", json!(2), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get_value("k"), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ttl_expiration() {
        let store = MemoryStore::new();
        store.set_value("key", json!("value"), Duration::from_secs(1));

        assert_eq!(store.get_value("key"), Some(json!("value")));

        std::thread::sleep(Duration::from_secs(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_value("key"), None);
        // Expired entry is dropped by the read
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_zero_ttl_is_immediately_absent() {
        let store = MemoryStore::new();
        store.set_value("k", json!(true), Duration::ZERO);
        assert_eq!(store.get_value("k"), None);
    }

    #[test]
    fn test_clear() {
        let store = MemoryStore::new();
        store.set_value("key1", json!("value1"), Duration::from_secs(60));
        store.set_value("key2", json!("value2"), Duration::from_secs(60));
        assert_eq!(store.len(), 2);

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.get_value("key1"), None);
    }

    #[test]
    fn test_returned_value_is_a_copy() {
        let store = MemoryStore::new();
        store.set_value("k", json!({"sql": "SELECT 1"}), Duration::from_secs(60));

        let mut first = store.get_value("k").unwrap();
        first["sql"] = json!("DROP TABLE sales");

        assert_eq!(store.get_value("k"), Some(json!({"sql": "SELECT 1"})));
    }

    #[tokio::test]
    async fn test_concurrent_writers_last_write_wins() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set("shared", json!(i), Duration::from_secs(60)).await.unwrap();
                store.get("shared").await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(store.len(), 1);
    }
}
