// src/context.rs
// Process-wide application state, built once at startup and shared by handlers

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::Cache;
use crate::config::ApiConfig;
use crate::ingest::{self, IngestReport};
use crate::monitoring::metrics;
use crate::providers::{OpenAiClient, ProviderError};
use crate::service::{QueryService, ServiceError, ServiceSettings};
use crate::vector_store::{InMemoryVectorStore, VectorStore, VectorStoreError};

// The per-call tokio timeout fires first; reqwest's own bound is a backstop.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum InitError {
    #[error("provider client: {0}")]
    Provider(#[from] ProviderError),

    #[error("vector store: {0}")]
    VectorStore(#[from] VectorStoreError),
}

pub struct AppContext {
    pub config: ApiConfig,
    pub service: QueryService,
}

impl AppContext {
    pub async fn init(config: ApiConfig) -> Result<Self, InitError> {
        let cache = Cache::from_config(&config.cache).await;

        let client = Arc::new(OpenAiClient::new(
            &config.openai_base_url,
            &config.openai_api_key,
            config.timeout + HTTP_TIMEOUT_SLACK,
        )?);

        let store: Arc<dyn VectorStore> = match &config.vector_persist_dir {
            Some(dir) => Arc::new(InMemoryVectorStore::open(dir, &config.vector_collection)?),
            None => Arc::new(InMemoryVectorStore::new(&config.vector_collection)),
        };
        metrics::CHUNKS_TOTAL.set(store.len().await as i64);

        let settings = ServiceSettings {
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            default_top_k: config.top_k,
            timeout: config.timeout,
        };
        let service = QueryService::new(cache, client.clone(), store, client, settings);

        Ok(Self::from_parts(config, service))
    }

    /// Assemble from an already-built service (tests, alternate providers).
    pub fn from_parts(config: ApiConfig, service: QueryService) -> Self {
        Self { config, service }
    }

    pub async fn ingest(&self) -> Result<IngestReport, ServiceError> {
        ingest::ingest_corpus(&self.service, &self.config.corpus_dir, self.config.chunk_size).await
    }

    /// Flush the vector store and log final cache counters.
    pub async fn shutdown(&self) {
        if let Err(e) = self.service.store().persist().await {
            warn!(error = %e, "Failed to persist vector store on shutdown");
        }
        let stats = self.service.cache().stats().await;
        info!(
            backend = stats.backend.as_str(),
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            hit_rate = stats.hit_rate(),
            "Shutdown complete"
        );
    }
}
