// src/cache/redis_cache.rs - Remote cache backend over Redis

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::time::error::Elapsed;
use tracing::{info, warn};

use super::{BackendKind, CacheBackend, CacheConfig, CacheError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open(Instant),
    /// One trial call admitted at the given instant, not yet settled
    HalfOpen(Instant),
}

/// Consecutive-failure breaker in front of the remote store.
///
/// After `threshold` faults in a row the breaker opens and calls are refused
/// without touching the network until `cooldown` has elapsed. Then exactly
/// one trial call is admitted: success closes the breaker, a fault re-opens
/// it. A trial that never settles (its request was dropped) is replaced by a
/// new one after another cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: AtomicU32,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// `threshold == 0` disables the breaker.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failures: AtomicU32::new(0),
            state: Mutex::new(BreakerState::Closed),
        }
    }

    pub fn allow(&self) -> bool {
        if self.threshold == 0 {
            return true;
        }
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed => true,
            BreakerState::Open(since) | BreakerState::HalfOpen(since)
                if since.elapsed() >= self.cooldown =>
            {
                *state = BreakerState::HalfOpen(Instant::now());
                true
            }
            BreakerState::Open(_) | BreakerState::HalfOpen(_) => false,
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state != BreakerState::Closed {
            info!("Remote cache circuit closed");
        }
        *state = BreakerState::Closed;
    }

    pub fn record_failure(&self) {
        if self.threshold == 0 {
            return;
        }
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        match *state {
            BreakerState::HalfOpen(_) => {
                warn!("Remote cache trial call failed, circuit re-opened");
                *state = BreakerState::Open(Instant::now());
            }
            BreakerState::Closed if failures >= self.threshold => {
                warn!(
                    failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Remote cache circuit opened"
                );
                *state = BreakerState::Open(Instant::now());
            }
            _ => {}
        }
    }

    /// True while calls are being refused or a trial is pending.
    pub fn is_open(&self) -> bool {
        *self.state.lock() != BreakerState::Closed
    }
}

/// Redis-backed cache, one long-lived multiplexed connection per process
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
    op_timeout: Duration,
    breaker: std::sync::Arc<CircuitBreaker>,
}

impl RedisStore {
    /// Open the connection and verify it with a PING.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| CacheError::Unavailable(format!("invalid redis url: {}", e)))?;

        let mut conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Unavailable("redis connect timed out".to_string()))?
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        info!(
            url = %config.redis_url,
            namespace = %config.namespace,
            reply = %pong,
            "Redis cache connected"
        );

        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
            op_timeout: config.remote_timeout,
            breaker: std::sync::Arc::new(CircuitBreaker::new(
                config.breaker_threshold,
                config.breaker_cooldown,
            )),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn guard(&self) -> Result<(), CacheError> {
        if self.breaker.allow() {
            Ok(())
        } else {
            Err(CacheError::Unavailable("circuit open".to_string()))
        }
    }

    fn settle<T>(&self, result: Result<RedisResult<T>, Elapsed>) -> Result<T, CacheError> {
        match result {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                Err(CacheError::Unavailable(e.to_string()))
            }
            Err(_) => {
                self.breaker.record_failure();
                Err(CacheError::Unavailable(format!(
                    "redis timed out after {} ms",
                    self.op_timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl CacheBackend for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.guard()?;
        let mut conn = self.conn.clone();
        let full_key = self.namespaced(key);

        let result =
            tokio::time::timeout(self.op_timeout, conn.get::<_, Option<String>>(&full_key)).await;
        match self.settle(result)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CacheError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let json =
            serde_json::to_string(&value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.guard()?;
        let mut conn = self.conn.clone();
        let full_key = self.namespaced(key);
        // SETEX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);

        let result = tokio::time::timeout(
            self.op_timeout,
            conn.set_ex::<_, _, ()>(&full_key, json, ttl_secs),
        )
        .await;
        self.settle(result)
    }

    /// Deletes every key under this store's namespace.
    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:*", self.namespace);

        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| CacheError::Admin(format!("redis KEYS failed: {}", e)))?;
        let count = keys.len();
        if !keys.is_empty() {
            conn.del::<_, ()>(keys)
                .await
                .map_err(|e| CacheError::Admin(format!("redis DEL failed: {}", e)))?;
        }
        self.breaker.record_success();
        info!(namespace = %self.namespace, deleted = count, "Redis cache namespace flushed");
        Ok(())
    }

    async fn entry_count(&self) -> Option<usize> {
        None
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}
