//! Vector store for documentation chunks
//!
//! In-process collection ranked by cosine similarity. When a persistence
//! directory is configured the collection is snapshotted as JSON to
//! `<dir>/<collection>.json` and reloaded at startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::providers::Embedding;

const SNAPSHOT_VERSION: u32 = 1;

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk: usize,
}

/// One retrieval hit, in relevance order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vector store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError>;

    /// Insert or overwrite the chunk stored under `id`.
    async fn add(
        &self,
        chunk: &str,
        metadata: ChunkMetadata,
        id: &str,
        embedding: Embedding,
    ) -> Result<(), VectorStoreError>;

    async fn len(&self) -> usize;

    /// Flush to durable storage if the store has any.
    async fn persist(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    text: String,
    metadata: ChunkMetadata,
    embedding: Embedding,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionSnapshot {
    version: u32,
    timestamp: i64,
    collection: String,
    records: Vec<StoredChunk>,
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<StoredChunk>,
    by_id: HashMap<String, usize>,
}

impl Collection {
    fn from_records(records: Vec<StoredChunk>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id.clone(), idx))
            .collect();
        Self { records, by_id }
    }

    fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.len())
    }
}

pub struct InMemoryVectorStore {
    name: String,
    persist_path: Option<PathBuf>,
    collection: RwLock<Collection>,
}

impl InMemoryVectorStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            persist_path: None,
            collection: RwLock::new(Collection::default()),
        }
    }

    /// Open a persisted collection, loading an existing snapshot if present.
    pub fn open(dir: &Path, name: &str) -> Result<Self, VectorStoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", name));

        let collection = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let snapshot: CollectionSnapshot = serde_json::from_str(&raw)?;
            info!(
                path = %path.display(),
                records = snapshot.records.len(),
                version = snapshot.version,
                "Loaded vector store snapshot"
            );
            Collection::from_records(snapshot.records)
        } else {
            Collection::default()
        };

        Ok(Self {
            name: name.to_string(),
            persist_path: Some(path),
            collection: RwLock::new(collection),
        })
    }

    fn write_snapshot(&self, path: &Path) -> Result<(), VectorStoreError> {
        let snapshot = CollectionSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp: chrono::Utc::now().timestamp(),
            collection: self.name.clone(),
            records: self.collection.read().records.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), records = snapshot.records.len(), "Vector store persisted");
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, VectorStoreError> {
        let collection = self.collection.read();
        if let Some(expected) = collection.dimension() {
            if expected != embedding.len() {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = collection
            .records
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                let score = similarity::cosine_similarity(embedding, &r.embedding);
                // NaN components rank below every real score
                (idx, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();
        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| {
                let r = &collection.records[idx];
                RetrievedChunk {
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                }
            })
            .collect())
    }

    async fn add(
        &self,
        chunk: &str,
        metadata: ChunkMetadata,
        id: &str,
        embedding: Embedding,
    ) -> Result<(), VectorStoreError> {
        let mut collection = self.collection.write();
        if let Some(expected) = collection.dimension() {
            if expected != embedding.len() {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let record = StoredChunk {
            id: id.to_string(),
            text: chunk.to_string(),
            metadata,
            embedding,
        };
        match collection.by_id.get(id).copied() {
            Some(idx) => collection.records[idx] = record,
            None => {
                let idx = collection.records.len();
                collection.records.push(record);
                collection.by_id.insert(id.to_string(), idx);
            }
        }
        Ok(())
    }

    async fn len(&self) -> usize {
        self.collection.read().records.len()
    }

    async fn persist(&self) -> Result<(), VectorStoreError> {
        match &self.persist_path {
            Some(path) => self.write_snapshot(path),
            None => Ok(()),
        }
    }
}

pub mod similarity {
    /// Cosine similarity between two vectors; 0.0 for empty or zero vectors
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a == 0.0 || mag_b == 0.0 {
            0.0
        } else {
            dot / (mag_a * mag_b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str, chunk: usize) -> ChunkMetadata {
        ChunkMetadata {
            source: source.to_string(),
            chunk,
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let store = InMemoryVectorStore::new("docs");
        store.add("sales table", meta("sales.md", 0), "sales.md-0", vec![1.0, 0.0]).await.unwrap();
        store.add("stores table", meta("stores.md", 0), "stores.md-0", vec![0.0, 1.0]).await.unwrap();
        store.add("mixed", meta("misc.md", 0), "misc.md-0", vec![0.7, 0.7]).await.unwrap();

        let hits = store.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "sales table");
        assert_eq!(hits[1].text, "mixed");
    }

    #[tokio::test]
    async fn test_k_larger_than_collection() {
        let store = InMemoryVectorStore::new("docs");
        store.add("only", meta("a.md", 0), "a.md-0", vec![1.0]).await.unwrap();
        assert_eq!(store.query(&[1.0], 10).await.unwrap().len(), 1);
        assert!(InMemoryVectorStore::new("empty").query(&[1.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_same_id_overwrites() {
        let store = InMemoryVectorStore::new("docs");
        store.add("v1", meta("a.md", 0), "a.md-0", vec![1.0, 0.0]).await.unwrap();
        store.add("v2", meta("a.md", 0), "a.md-0", vec![1.0, 0.0]).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.query(&[1.0, 0.0], 1).await.unwrap()[0].text, "v2");
    }

    #[tokio::test]
    async fn test_nan_scores_rank_last() {
        let store = InMemoryVectorStore::new("docs");
        store.add("broken", meta("bad.md", 0), "bad.md-0", vec![f32::NAN, 1.0]).await.unwrap();
        store.add("sales", meta("sales.md", 0), "sales.md-0", vec![1.0, 0.0]).await.unwrap();
        store.add("stores", meta("stores.md", 0), "stores.md-0", vec![0.0, 1.0]).await.unwrap();

        let texts: Vec<String> = store
            .query(&[1.0, 0.2], 3)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.text)
            .collect();
        assert_eq!(texts, vec!["sales", "stores", "broken"]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = InMemoryVectorStore::new("docs");
        store.add("a", meta("a.md", 0), "a.md-0", vec![1.0, 0.0]).await.unwrap();
        let err = store.query(&[1.0, 0.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = InMemoryVectorStore::open(dir.path(), "querybuilder_docs").unwrap();
            store.add("chunk A", meta("doc1.md", 0), "doc1.md-0", vec![0.1, 0.2]).await.unwrap();
            store.add("chunk B", meta("doc1.md", 1), "doc1.md-1", vec![0.2, 0.1]).await.unwrap();
            store.persist().await.unwrap();
        }

        let reopened = InMemoryVectorStore::open(dir.path(), "querybuilder_docs").unwrap();
        assert_eq!(reopened.len().await, 2);
        let hits = reopened.query(&[0.1, 0.2], 1).await.unwrap();
        assert_eq!(hits[0].metadata, meta("doc1.md", 0));
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert_eq!(similarity::cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(similarity::cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((similarity::cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }
}
