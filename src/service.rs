//! Cache-fronted query operations
//!
//! Three expensive calls sit behind the cache, each with its own key domain
//! and TTL:
//!
//! | operation | key inputs | expensive call |
//! |---|---|---|
//! | embedding | text, embedding model | embedding provider |
//! | retrieval | query text, k | embedding + vector store query |
//! | answer | question, k, generation model | retrieval + prompt + generation |
//!
//! Cache faults never fail a request: a failed read is a miss and a failed
//! write is dropped. Upstream faults and timeouts always propagate.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheError, CacheKey, Domain};
use crate::cache_key;
use crate::monitoring::metrics;
use crate::prompt::{self, SYSTEM_PROMPT};
use crate::providers::{Embedding, EmbeddingProvider, GenerationProvider, ProviderError};
use crate::vector_store::{RetrievedChunk, VectorStore, VectorStoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{operation} failed: {source}")]
    Upstream {
        operation: &'static str,
        source: ProviderError,
    },

    #[error("vector store failed: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Generation succeeded but the text held no usable JSON object
    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Per-request cache policy. `use_cache: false` skips every cache read and
/// write made on behalf of the request, nested layers included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub use_cache: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

impl RequestOptions {
    pub fn bypass() -> Self {
        Self { use_cache: false }
    }
}

/// A value plus whether it was served from cache
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

/// Structured answer returned by `/report`.
///
/// `cached` is provenance, not content: it is always stored as `false` and
/// only flipped on the copy handed back from a cache hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub tables_used: Vec<String>,
    pub columns_used: Vec<String>,
    pub joins_explained: Vec<String>,
    pub assumptions: Vec<String>,
    pub sql: String,
    pub retrieved_chunks: usize,
    pub model_used: String,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub model: String,
    pub embed_model: String,
    pub default_top_k: usize,
    /// Bound on each upstream call
    pub timeout: Duration,
}

pub struct QueryService {
    cache: Cache,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationProvider>,
    settings: ServiceSettings,
}

impl QueryService {
    pub fn new(
        cache: Cache,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationProvider>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            cache,
            embedder,
            store,
            generator,
            settings,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Embedding for `text` under the configured embedding model.
    pub async fn embed(
        &self,
        text: &str,
        opts: RequestOptions,
    ) -> Result<Cached<Embedding>, ServiceError> {
        let model = self.settings.embed_model.as_str();
        let key = cache_key!(Domain::Embed, text, model);

        self.cached(Domain::Embed, key, opts, || {
            self.bounded("embedding", async move {
                self.embedder
                    .embed(text, model)
                    .await
                    .map_err(|source| ServiceError::Upstream {
                        operation: "embedding",
                        source,
                    })
            })
        })
        .await
    }

    /// Top-`k` chunks for `query`, in relevance order.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        opts: RequestOptions,
    ) -> Result<Cached<Vec<RetrievedChunk>>, ServiceError> {
        let key = cache_key!(Domain::Retrieval, query, k);

        self.cached(Domain::Retrieval, key, opts, || async move {
            let embedding = self.embed(query, opts).await?.value;
            self.bounded("retrieval", async {
                self.store
                    .query(&embedding, k)
                    .await
                    .map_err(ServiceError::from)
            })
            .await
        })
        .await
    }

    /// Full question answering. `top_k` of `None` or `0` uses the default.
    pub async fn answer(
        &self,
        question: &str,
        top_k: Option<usize>,
        opts: RequestOptions,
    ) -> Result<Answer, ServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "question must not be empty".to_string(),
            ));
        }
        let k = top_k
            .filter(|k| *k > 0)
            .unwrap_or(self.settings.default_top_k);
        let model = self.settings.model.as_str();
        let key = cache_key!(Domain::Response, question, k, model);

        let result = self
            .cached(Domain::Response, key, opts, || {
                self.generate_answer(question, k, opts)
            })
            .await?;

        let mut answer = result.value;
        answer.cached = result.from_cache;
        metrics::record_answer(answer.cached);
        info!(
            k,
            retrieved_chunks = answer.retrieved_chunks,
            cached = answer.cached,
            "Answer ready"
        );
        Ok(answer)
    }

    async fn generate_answer(
        &self,
        question: &str,
        k: usize,
        opts: RequestOptions,
    ) -> Result<Answer, ServiceError> {
        let contexts = self.retrieve(question, k, opts).await?.value;
        let user_prompt = prompt::build_prompt_with_context(question, &contexts);
        let model = self.settings.model.as_str();

        let raw = self
            .bounded("generation", async {
                self.generator
                    .complete(SYSTEM_PROMPT, &user_prompt, model)
                    .await
                    .map_err(|source| ServiceError::Upstream {
                        operation: "generation",
                        source,
                    })
            })
            .await?;

        let parsed = prompt::parse_generated_query(&raw).map_err(|reason| {
            warn!(raw_len = raw.len(), %reason, "Generation output is not usable JSON");
            ServiceError::InvalidModelOutput(reason)
        })?;

        Ok(Answer {
            tables_used: parsed.tables_used,
            columns_used: parsed.columns_used,
            joins_explained: parsed.joins_explained,
            assumptions: parsed.assumptions,
            sql: parsed.sql,
            retrieved_chunks: contexts.len(),
            model_used: self.settings.model.clone(),
            cached: false,
        })
    }

    /// get → on hit return → on miss compute → set → return.
    async fn cached<T, F, Fut>(
        &self,
        domain: Domain,
        key: CacheKey,
        opts: RequestOptions,
        compute: F,
    ) -> Result<Cached<T>, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let use_cache = opts.use_cache && self.cache.is_enabled();

        if use_cache {
            match self.cache.get::<T>(&key).await {
                Ok(Some(value)) => {
                    self.cache.record_hit(domain);
                    debug!(%domain, key = %key, "Cache hit");
                    return Ok(Cached {
                        value,
                        from_cache: true,
                    });
                }
                Ok(None) => {
                    self.cache.record_miss(domain);
                    debug!(%domain, key = %key, "Cache miss");
                }
                Err(e) => {
                    self.cache.record_miss(domain);
                    warn!(%domain, key = %key, error = %e, "Cache read failed, treating as miss");
                }
            }
        }

        let value = compute().await?;

        if use_cache {
            let ttl = self.cache.ttl().for_domain(domain);
            if let Err(e) = self.cache.set(&key, &value, ttl).await {
                warn!(%domain, key = %key, error = %e, "Cache write dropped");
            }
        }

        Ok(Cached {
            value,
            from_cache: false,
        })
    }

    /// Run an upstream call under the configured timeout and record latency.
    async fn bounded<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let started = Instant::now();
        let result = tokio::time::timeout(self.settings.timeout, call).await;
        metrics::observe_upstream_latency_ms(operation, started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(inner) => inner,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.settings.timeout.as_millis() as u64,
                    "Upstream call timed out"
                );
                Err(ServiceError::Timeout {
                    operation,
                    after: self.settings.timeout,
                })
            }
        }
    }
}
