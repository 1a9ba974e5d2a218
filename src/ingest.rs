// src/ingest.rs
// Corpus ingestion: *.md files -> fixed-size chunks -> embeddings -> vector store

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::monitoring::metrics;
use crate::service::{QueryService, RequestOptions, ServiceError};
use crate::vector_store::ChunkMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub message: String,
}

/// Split into consecutive pieces of at most `chunk_size` characters.
/// Splits on char boundaries, never inside a multi-byte sequence.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Markdown files directly inside `dir`, sorted by name.
pub fn corpus_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable corpus entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("md"))
        .collect();
    files.sort();
    files
}

pub async fn ingest_corpus(
    service: &QueryService,
    corpus_dir: &Path,
    chunk_size: usize,
) -> Result<IngestReport, ServiceError> {
    if !corpus_dir.is_dir() {
        return Ok(IngestReport {
            files: 0,
            chunks: 0,
            message: format!("Corpus dir not found: {}", corpus_dir.display()),
        });
    }

    let files = corpus_files(corpus_dir);
    if files.is_empty() {
        return Ok(IngestReport {
            files: 0,
            chunks: 0,
            message: format!("No .md files found in {}", corpus_dir.display()),
        });
    }

    let mut total_chunks = 0;
    for path in &files {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServiceError::Ingest(format!("{}: {}", path.display(), e)))?;

        let chunks = chunk_text(&content, chunk_size);
        for (idx, chunk) in chunks.iter().enumerate() {
            let embedding = service.embed(chunk, RequestOptions::default()).await?.value;
            let id = format!("{}-{}", source, idx);
            service
                .store()
                .add(
                    chunk,
                    ChunkMetadata {
                        source: source.clone(),
                        chunk: idx,
                    },
                    &id,
                    embedding,
                )
                .await?;
        }
        info!(file = %source, chunks = chunks.len(), "Ingested corpus file");
        total_chunks += chunks.len();
    }

    service.store().persist().await?;
    metrics::CHUNKS_TOTAL.set(service.store().len().await as i64);

    // Retrievals and answers computed against the old corpus are now stale
    if total_chunks > 0 {
        if let Err(e) = service.cache().clear().await {
            warn!(error = %e, "Cache invalidation after ingestion failed");
        }
    }

    Ok(IngestReport {
        files: files.len(),
        chunks: total_chunks,
        message: "Ingestion completed".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_text_fixed_size() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunk_text_multibyte() {
        let chunks = chunk_text("ãéíõú", 2);
        assert_eq!(chunks, vec!["ãé", "íõ", "ú"]);
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn test_corpus_files_sorted_md_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.md")).unwrap();

        let names: Vec<String> = corpus_files(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }
}
