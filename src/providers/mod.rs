// src/providers/mod.rs
// Upstream model providers: embeddings and chat generation

pub mod openai;

pub use openai::OpenAiClient;

use thiserror::Error;

/// Embedding vector, fixed dimensionality per embedding model
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, model: &str) -> Result<Embedding, ProviderError>;
}

#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Returns the raw completion text, expected to contain one JSON object.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
    ) -> Result<String, ProviderError>;
}
