// src/cache/mod.rs - Caching layer
// Backend abstraction over an in-process store and Redis

pub mod key;
pub mod memory;
pub mod redis_cache;

pub use key::{CacheKey, Domain, KeyPart};
pub use memory::MemoryStore;
pub use redis_cache::RedisStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::monitoring::metrics;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Remote store unreachable, timed out, or refused by the breaker
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization failed: {0}")]
    Serialization(String),

    /// Explicit administrative action failed
    #[error("cache administration failed: {0}")]
    Admin(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            _ => Err(format!("Unknown cache backend: {}", s)),
        }
    }
}

/// Storage contract shared by every backend.
///
/// Values cross this boundary as owned `serde_json::Value`s so a backend
/// never hands out a reference into its own storage.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
    /// Approximate number of stored entries, when the backend can tell cheaply.
    async fn entry_count(&self) -> Option<usize>;
    fn kind(&self) -> BackendKind;
}

/// TTL per cached operation
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub embed: Duration,
    pub retrieval: Duration,
    pub response: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            embed: Duration::from_secs(24 * 3600),
            retrieval: Duration::from_secs(6 * 3600),
            response: Duration::from_secs(3600),
        }
    }
}

impl CacheTtls {
    pub fn for_domain(&self, domain: Domain) -> Duration {
        match domain {
            Domain::Embed => self.embed,
            Domain::Retrieval => self.retrieval,
            Domain::Response => self.response,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: BackendKind,
    pub redis_url: String,
    pub namespace: String,
    pub remote_timeout: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    pub ttl: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            namespace: "querybuilder".to_string(),
            remote_timeout: Duration::from_millis(500),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            ttl: CacheTtls::default(),
        }
    }
}

/// Statistics reported by the admin endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub backend: BackendKind,
    pub entries: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Process-wide cache handle: the selected backend plus the global switch.
///
/// Cheap to clone; clones share the backend and counters.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    ttl: CacheTtls,
    counters: Arc<Counters>,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, enabled: bool, ttl: CacheTtls) -> Self {
        Self {
            backend,
            enabled,
            ttl,
            counters: Arc::new(Counters::default()),
        }
    }

    /// In-process cache with default TTLs, mostly for tests and tooling.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), true, CacheTtls::default())
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(MemoryStore::new()), false, CacheTtls::default())
    }

    /// Select the backend once at startup.
    ///
    /// A Redis backend that cannot be reached degrades to the memory store.
    pub async fn from_config(config: &CacheConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryStore::new()),
            BackendKind::Redis => match RedisStore::connect(config).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(
                        url = %config.redis_url,
                        error = %e,
                        "Redis cache unavailable, falling back to in-memory cache"
                    );
                    Arc::new(MemoryStore::new())
                }
            },
        };

        info!(
            enabled = config.enabled,
            backend = backend.kind().as_str(),
            "Cache initialized"
        );
        Self::new(backend, config.enabled, config.ttl)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn ttl(&self) -> &CacheTtls {
        &self.ttl
    }

    /// Typed lookup. `Ok(None)` when disabled or absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }

        let raw = match self.backend.get(key.as_str()).await {
            Ok(raw) => raw,
            Err(e) => {
                self.record_error("get");
                return Err(e);
            }
        };

        match raw {
            Some(value) => match serde_json::from_value(value) {
                Ok(decoded) => Ok(Some(decoded)),
                Err(e) => {
                    self.record_error("decode");
                    Err(CacheError::Serialization(e.to_string()))
                }
            },
            None => Ok(None),
        }
    }

    /// Typed store. No-op when disabled.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        let encoded = serde_json::to_value(value).map_err(|e| {
            self.record_error("encode");
            CacheError::Serialization(e.to_string())
        })?;

        self.backend
            .set(key.as_str(), encoded, ttl)
            .await
            .map_err(|e| {
                self.record_error("set");
                e
            })
    }

    /// Administrative flush. Runs even when lookups are disabled so stale
    /// remote entries can be dropped before the switch is turned back on.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear().await.map_err(|e| match e {
            CacheError::Admin(_) => e,
            other => CacheError::Admin(other.to_string()),
        })?;
        info!(backend = self.backend.kind().as_str(), "Cache cleared");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            backend: self.backend.kind(),
            entries: self.backend.entry_count().await,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_hit(&self, domain: Domain) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_HITS_TOTAL
            .with_label_values(&[domain.as_str()])
            .inc();
    }

    pub(crate) fn record_miss(&self, domain: Domain) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_MISSES_TOTAL
            .with_label_values(&[domain.as_str()])
            .inc();
    }

    fn record_error(&self, op: &str) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        metrics::CACHE_ERRORS_TOTAL.with_label_values(&[op]).inc();
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.kind())
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key;
    use serde_json::json;

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn entry_count(&self) -> Option<usize> {
            None
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = Cache::in_memory();
        let key = cache_key!(Domain::Embed, "text", "model");
        let embedding: Vec<f32> = vec![0.1, -0.25, 1.0e-7, 3.4028235e38];

        cache.set(&key, &embedding, Duration::from_secs(60)).await.unwrap();
        let back: Option<Vec<f32>> = cache.get(&key).await.unwrap();
        assert_eq!(back, Some(embedding));
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = Cache::disabled();
        let key = cache_key!(Domain::Response, "q");

        cache.set(&key, &"value", Duration::from_secs(60)).await.unwrap();
        let got: Option<String> = cache.get(&key).await.unwrap();
        assert_eq!(got, None);
        assert_eq!(cache.stats().await.entries, Some(0));
    }

    #[tokio::test]
    async fn test_decode_mismatch_is_serialization_error() {
        let cache = Cache::in_memory();
        let key = cache_key!(Domain::Embed, "x");
        cache.set(&key, &json!({"not": "a vector"}), Duration::from_secs(60)).await.unwrap();

        let result: Result<Option<Vec<f32>>, _> = cache.get(&key).await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
        assert_eq!(cache.stats().await.errors, 1);
    }

    #[tokio::test]
    async fn test_clear_failure_is_admin_error() {
        let cache = Cache::new(Arc::new(BrokenBackend), true, CacheTtls::default());
        match cache.clear().await {
            Err(CacheError::Admin(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected admin error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_clear_removes_entries() {
        let cache = Cache::in_memory();
        let key = cache_key!(Domain::Retrieval, "q", 6usize);
        cache.set(&key, &vec!["a"], Duration::from_secs(60)).await.unwrap();

        cache.clear().await.unwrap();
        let got: Option<Vec<String>> = cache.get(&key).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let config = CacheConfig {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:1/".to_string(),
            ..CacheConfig::default()
        };
        let cache = Cache::from_config(&config).await;
        assert_eq!(cache.backend_kind(), BackendKind::Memory);
        assert!(cache.is_enabled());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("memcached".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            enabled: true,
            backend: BackendKind::Memory,
            entries: Some(0),
            hits: 10,
            misses: 5,
            errors: 0,
        };
        assert_eq!(stats.hit_rate(), 10.0 / 15.0);
    }
}
