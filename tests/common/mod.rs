// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use querybuilder::cache::{
    BackendKind, Cache, CacheBackend, CacheError, CacheTtls, MemoryStore,
};
use querybuilder::providers::{Embedding, EmbeddingProvider, GenerationProvider, ProviderError};
use querybuilder::service::{QueryService, ServiceSettings};
use querybuilder::vector_store::{ChunkMetadata, InMemoryVectorStore, VectorStore};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MODEL: &str = "gpt-test";
pub const EMBED_MODEL: &str = "embed-test";

pub const ANSWER_JSON: &str = r#"{
  "tables_used": ["sales", "stores"],
  "columns_used": ["sales.total_amount", "stores.name"],
  "joins_explained": ["sales.store_id = stores.id"],
  "assumptions": ["last 90 days"],
  "sql": "SELECT stores.name, SUM(sales.total_amount) FROM sales JOIN stores ON sales.store_id = stores.id GROUP BY stores.name"
}"#;

/// Deterministic embedder: vector derived from the text bytes
#[derive(Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    pub fail_with: Option<ProviderError>,
}

impl FakeEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn embedding_for(text: &str) -> Embedding {
    let bytes = text.as_bytes();
    let sum: u32 = bytes.iter().map(|b| *b as u32).sum();
    vec![
        bytes.len() as f32,
        (sum % 97) as f32 + 0.125,
        bytes.first().copied().unwrap_or(0) as f32,
    ]
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str, _model: &str) -> Result<Embedding, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(embedding_for(text)),
        }
    }
}

pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub response: String,
    pub delay: Option<Duration>,
}

impl FakeGenerator {
    pub fn replying(response: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: response.to_string(),
            delay: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _model: &str,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

/// Memory store that counts every call made through the backend contract
#[derive(Default)]
pub struct CountingBackend {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub clears: AtomicUsize,
}

impl CountingBackend {
    pub fn interactions(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for CountingBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear().await
    }

    async fn entry_count(&self) -> Option<usize> {
        self.inner.entry_count().await
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }
}

/// Stands in for an unreachable Redis
#[derive(Default)]
pub struct UnreachableBackend {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl CacheBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection reset by peer".into()))
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection reset by peer".into()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection reset by peer".into()))
    }

    async fn entry_count(&self) -> Option<usize> {
        None
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

pub struct Harness {
    pub service: QueryService,
    pub embedder: Arc<FakeEmbedder>,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<InMemoryVectorStore>,
}

pub fn settings(timeout: Duration) -> ServiceSettings {
    ServiceSettings {
        model: MODEL.to_string(),
        embed_model: EMBED_MODEL.to_string(),
        default_top_k: 6,
        timeout,
    }
}

pub fn harness_with(
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    embedder: FakeEmbedder,
    generator: FakeGenerator,
    timeout: Duration,
) -> Harness {
    let embedder = Arc::new(embedder);
    let generator = Arc::new(generator);
    let store = Arc::new(InMemoryVectorStore::new("test_docs"));
    let cache = Cache::new(backend, enabled, CacheTtls::default());
    let service = QueryService::new(
        cache,
        embedder.clone(),
        store.clone(),
        generator.clone(),
        settings(timeout),
    );
    Harness {
        service,
        embedder,
        generator,
        store,
    }
}

pub fn harness(backend: Arc<dyn CacheBackend>) -> Harness {
    harness_with(
        backend,
        true,
        FakeEmbedder::default(),
        FakeGenerator::replying(ANSWER_JSON),
        Duration::from_secs(5),
    )
}

/// Load the store with chunks whose embeddings come from `embedding_for`.
pub async fn seed(store: &InMemoryVectorStore, chunks: &[(&str, &str, usize)]) {
    for (text, source, idx) in chunks {
        store
            .add(
                text,
                ChunkMetadata {
                    source: source.to_string(),
                    chunk: *idx,
                },
                &format!("{}-{}", source, idx),
                embedding_for(text),
            )
            .await
            .unwrap();
    }
}
