// src/config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::cache::{BackendKind, CacheConfig, CacheTtls};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub model: String,
    pub embed_model: String,

    pub corpus_dir: PathBuf,
    pub top_k: usize,
    pub chunk_size: usize,
    pub timeout: Duration,

    pub vector_persist_dir: Option<PathBuf>,
    pub vector_collection: String,

    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let openai_api_key = get("OPENAI_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let vector_persist_dir = get("VECTOR_PERSIST_DIR")
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let cache_defaults = CacheConfig::default();
        let ttl_defaults = CacheTtls::default();
        let cache = CacheConfig {
            enabled: parse_bool(&lookup, "CACHE_ENABLED", cache_defaults.enabled)?,
            backend: parse_or(&lookup, "CACHE_BACKEND", cache_defaults.backend)?,
            redis_url: or("REDIS_URL", &cache_defaults.redis_url),
            namespace: or("CACHE_NAMESPACE", &cache_defaults.namespace),
            remote_timeout: Duration::from_millis(parse_or(
                &lookup,
                "CACHE_REMOTE_TIMEOUT_MS",
                cache_defaults.remote_timeout.as_millis() as u64,
            )?),
            breaker_threshold: parse_or(
                &lookup,
                "CACHE_BREAKER_THRESHOLD",
                cache_defaults.breaker_threshold,
            )?,
            breaker_cooldown: Duration::from_secs(parse_or(
                &lookup,
                "CACHE_BREAKER_COOLDOWN_SECS",
                cache_defaults.breaker_cooldown.as_secs(),
            )?),
            ttl: CacheTtls {
                embed: Duration::from_secs(parse_or(
                    &lookup,
                    "CACHE_TTL_EMBED_SECS",
                    ttl_defaults.embed.as_secs(),
                )?),
                retrieval: Duration::from_secs(parse_or(
                    &lookup,
                    "CACHE_TTL_RETRIEVAL_SECS",
                    ttl_defaults.retrieval.as_secs(),
                )?),
                response: Duration::from_secs(parse_or(
                    &lookup,
                    "CACHE_TTL_RESPONSE_SECS",
                    ttl_defaults.response.as_secs(),
                )?),
            },
        };

        let top_k: usize = parse_or(&lookup, "TOP_K", 6)?;
        if top_k == 0 {
            return Err(ConfigError::Invalid {
                key: "TOP_K",
                value: "0".to_string(),
            });
        }
        let chunk_size: usize = parse_or(&lookup, "CHUNK_SIZE", 2000)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host: or("BACKEND_HOST", "127.0.0.1"),
            port: parse_or(&lookup, "BACKEND_PORT", 3010)?,
            openai_api_key,
            openai_base_url: or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: or("OPENAI_MODEL", "gpt-4-turbo-preview"),
            embed_model: or("OPENAI_EMBED_MODEL", "text-embedding-3-small"),
            corpus_dir: PathBuf::from(or("CORPUS_DIR", "./corpus")),
            top_k,
            chunk_size,
            timeout: Duration::from_secs(parse_or(&lookup, "TIMEOUT_SECONDS", 180)?),
            vector_persist_dir,
            vector_collection: or("VECTOR_COLLECTION", "querybuilder_docs"),
            cache,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_env(&self) {
        info!(
            openai_api_key = "***",
            openai_base_url = %self.openai_base_url,
            model = %self.model,
            embed_model = %self.embed_model,
            corpus_dir = %self.corpus_dir.display(),
            top_k = self.top_k,
            chunk_size = self.chunk_size,
            timeout_secs = self.timeout.as_secs(),
            vector_persist_dir = %self
                .vector_persist_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(in-memory)".to_string()),
            vector_collection = %self.vector_collection,
            "Configuration loaded"
        );
        info!(
            enabled = self.cache.enabled,
            backend = self.cache.backend.as_str(),
            redis_url = %self.cache.redis_url,
            namespace = %self.cache.namespace,
            ttl_embed_secs = self.cache.ttl.embed.as_secs(),
            ttl_retrieval_secs = self.cache.ttl.retrieval.as_secs(),
            ttl_response_secs = self.cache.ttl.response.as_secs(),
            "Cache configuration"
        );
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: v }),
        },
    }
}
